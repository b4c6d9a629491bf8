//! Common topic extraction utilities

use lazy_static::lazy_static;

lazy_static! {
    static ref STOP_WORDS: Vec<&'static str> = vec![
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for",
        "of", "with", "by", "is", "am", "are", "was", "were", "be", "been",
        "being", "have", "has", "had", "do", "does", "did", "will", "would",
        "shall", "should", "may", "might", "must", "can", "could", "i", "you",
        "he", "she", "it", "we", "they", "me", "him", "her", "us", "them",
        "my", "your", "his", "its", "our", "their", "this", "that", "these",
        "those",
    ];
}

/// Extracts coarse topics from conversation text. Used to tag running
/// summaries so the sidebar and validator have something cheap to work with.
pub struct TopicExtractor {
    max_topics: usize,
    min_word_length: usize,
}

impl Default for TopicExtractor {
    fn default() -> Self {
        Self {
            max_topics: 3,
            min_word_length: 3,
        }
    }
}

impl TopicExtractor {
    pub fn new(max_topics: usize, min_word_length: usize) -> Self {
        Self { max_topics, min_word_length }
    }

    /// Extract topics from a single text
    pub fn extract_from_text(&self, text: &str) -> Vec<String> {
        let mut topics = Vec::new();
        let text_lower = text.to_lowercase();
        let words: Vec<&str> = text_lower.split_whitespace().collect();

        let question_words = ["what", "how", "why", "when", "where", "who", "which"];
        for i in 0..words.len().saturating_sub(1) {
            if question_words.contains(&words[i]) {
                let topic = self.extract_topic_phrase(&words, i + 1, 4);
                if !topic.is_empty() {
                    topics.push(topic);
                }
            }

            if words[i] == "about" || words[i] == "regarding" || words[i] == "discussing" {
                let topic = self.extract_topic_phrase(&words, i + 1, 3);
                if !topic.is_empty() {
                    topics.push(topic);
                }
            }
        }

        // Fallback: significant standalone words
        if topics.is_empty() {
            let significant: Vec<&str> = words.iter()
                .filter(|&&word| {
                    word.len() >= self.min_word_length && !STOP_WORDS.contains(&word)
                })
                .take(self.max_topics)
                .copied()
                .collect();

            if !significant.is_empty() {
                topics.push(significant.join(" "));
            }
        }

        topics.sort();
        topics.dedup();
        topics.truncate(self.max_topics);
        topics
    }

    /// Extract topics across the most recent messages of a conversation.
    pub fn extract_from_texts<'a, I>(&self, texts: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut all_topics = Vec::new();
        for text in texts {
            all_topics.extend(self.extract_from_text(text));
        }

        all_topics.sort();
        all_topics.dedup();
        all_topics.truncate(self.max_topics);
        all_topics
    }

    fn extract_topic_phrase(&self, words: &[&str], start: usize, max_words: usize) -> String {
        let end = (start + max_words).min(words.len());
        if start >= end {
            return String::new();
        }

        let phrase_words: Vec<&str> = words[start..end].iter()
            .filter(|&&word| word.len() >= self.min_word_length && !STOP_WORDS.contains(&word))
            .copied()
            .collect();

        phrase_words.join(" ")
    }
}
