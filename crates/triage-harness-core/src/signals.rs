//! Diagnostic signal extraction from issue text.
//!
//! Turns the concatenated title, body, and comment text of an issue into a
//! [`DiagnosticSignals`] value: error lines, exception type names, stack
//! trace excerpts, technology tags, and ranked keywords. Extraction is
//! pattern-based and never fails; empty text yields empty signals.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::models::{DiagnosticSignals, Issue, Keyword};
use crate::tuning::SignalTuning;

/// Technology keywords recognised anywhere in the issue text.
pub const TECH_VOCABULARY: &[&str] = &[
    "javascript",
    "typescript",
    "python",
    "java",
    "rust",
    "golang",
    "react",
    "vue",
    "angular",
    "svelte",
    "node.js",
    "nodejs",
    "deno",
    "django",
    "flask",
    "fastapi",
    "spring",
    "docker",
    "kubernetes",
    "webpack",
    "vite",
    "babel",
    "eslint",
    "jest",
    "graphql",
    "postgresql",
    "mysql",
    "mongodb",
    "redis",
    "sqlite",
    "android",
    "swift",
    "kotlin",
    "electron",
    "next.js",
    "express",
    "tensorflow",
    "pytorch",
    "pandas",
    "numpy",
    "ruby",
    "rails",
    "php",
    "laravel",
    "dotnet",
    "cmake",
    "gradle",
    "maven",
    "npm",
    "yarn",
    "pnpm",
    "tailwind",
    "linux",
    "windows",
    "macos",
    "grpc",
    "kafka",
    "nginx",
    "terraform",
    "webassembly",
    "websocket",
    "oauth",
    "tokio",
];

/// Words ignored by keyword extraction and precedent matching.
pub const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her", "was",
    "one", "our", "out", "has", "have", "him", "his", "how", "its", "may", "new", "now", "old",
    "see", "two", "way", "who", "did", "get", "got", "let", "put", "say", "she", "too", "use",
    "used", "using", "this", "that", "with", "from", "they", "them", "then", "than", "there",
    "their", "these", "those", "what", "when", "where", "which", "while", "will", "would",
    "could", "should", "been", "being", "into", "onto", "also", "just", "like", "some", "such",
    "only", "very", "more", "most", "much", "many", "each", "other", "about", "after", "before",
    "again", "here", "does", "doing", "done", "make", "made", "same", "seems", "seem", "still",
    "even", "because", "however", "thanks", "thank", "please", "issue", "issues", "problem",
    "working", "work", "works", "trying", "tried", "try", "expected", "actual", "behavior",
    "behaviour", "version", "following", "something", "anything", "nothing", "yes", "don",
    "doesn", "didn", "isn", "can't", "won", "it's", "i'm", "we're", "you're", "https", "http",
    "www", "com", "github",
];

fn error_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            // TypeError: ..., java.lang.IllegalStateException: ..., BuildFailed: ...
            r"\b[A-Za-z_][\w.$]*(?:Error|Exception|Failed)\s*:\s*\S.*",
            // error: ..., FATAL: ..., panic: ...
            r"(?i)\b(?:error|fatal|panic|failure|failed)\s*:\s*\S.*",
            // thread 'main' panicked at ...
            r"thread '[^']*' panicked at .+",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("static error pattern"))
        .collect()
    })
}

fn exception_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][A-Za-z0-9]*(?:Error|Exception))\b").expect("static exception pattern")
    })
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```[^\n]*\n(.*?)```").expect("static fence pattern"))
}

fn file_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\w\.[A-Za-z]{1,5}:\d+").expect("static file:line pattern"))
}

fn word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z][a-z0-9_']*").expect("static word pattern"))
}

/// Truncate to at most `max` characters, on a char boundary.
pub fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

/// Stateless extractor configured by [`SignalTuning`].
#[derive(Debug, Clone, Default)]
pub struct SignalExtractor {
    tuning: SignalTuning,
}

impl SignalExtractor {
    pub fn new(tuning: SignalTuning) -> Self {
        Self { tuning }
    }

    /// Extract signals from an issue's full text and labels.
    pub fn extract_issue(&self, issue: &Issue) -> DiagnosticSignals {
        self.extract(&issue.full_text(), &issue.labels)
    }

    /// Extract signals from raw text plus the issue's label names.
    pub fn extract(&self, text: &str, labels: &[String]) -> DiagnosticSignals {
        DiagnosticSignals {
            errors: self.extract_errors(text),
            exception_types: extract_exception_types(text),
            technologies: self.extract_technologies(text, labels),
            keywords: self.extract_keywords(text),
            stack_traces: self.extract_stack_traces(text),
        }
    }

    fn extract_errors(&self, text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut errors = Vec::new();

        for line in text.lines() {
            let matched = error_patterns()
                .iter()
                .find_map(|re| re.find(line).map(|m| m.as_str().trim()));

            let Some(found) = matched else { continue };
            if found.chars().count() <= self.tuning.min_error_len {
                continue;
            }
            let error = truncate_chars(found, self.tuning.max_error_len);
            if seen.insert(error.clone()) {
                errors.push(error);
                if errors.len() >= self.tuning.max_errors {
                    break;
                }
            }
        }

        errors
    }

    fn extract_stack_traces(&self, text: &str) -> Vec<String> {
        fence_re()
            .captures_iter(text)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str()))
            .filter(|block| is_trace_like(block))
            .take(self.tuning.max_stack_traces)
            .map(|block| truncate_chars(block.trim_end(), self.tuning.max_trace_len))
            .collect()
    }

    fn extract_technologies(&self, text: &str, labels: &[String]) -> Vec<String> {
        let lower = text.to_lowercase();

        let mut hits: Vec<(usize, &str)> = TECH_VOCABULARY
            .iter()
            .filter_map(|tech| lower.find(tech).map(|pos| (pos, *tech)))
            .collect();
        hits.sort_by_key(|(pos, _)| *pos);

        let mut seen = HashSet::new();
        let mut technologies = Vec::new();
        for (_, tech) in hits {
            if seen.insert(tech.to_string()) {
                technologies.push(tech.to_string());
            }
        }

        for label in labels {
            let label = label.trim().to_lowercase();
            if label.is_empty() || self.tuning.ignored_labels.contains(&label) {
                continue;
            }
            if seen.insert(label.clone()) {
                technologies.push(label);
            }
        }

        technologies
    }

    fn extract_keywords(&self, text: &str) -> Vec<Keyword> {
        let lower = text.to_lowercase();

        // term -> (count, first occurrence index)
        let mut counts: HashMap<&str, (u32, usize)> = HashMap::new();
        for (idx, m) in word_re().find_iter(&lower).enumerate() {
            let word = m.as_str().trim_end_matches('\'');
            if word.chars().count() < 3 || is_stopword(word) {
                continue;
            }
            counts.entry(word).or_insert((0, idx)).0 += 1;
        }

        let mut ranked: Vec<(&str, u32, usize)> = counts
            .into_iter()
            .map(|(term, (count, first))| (term, count, first))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));
        ranked.truncate(self.tuning.max_keywords);

        ranked
            .into_iter()
            .map(|(term, count, _)| Keyword {
                term: term.to_string(),
                count,
            })
            .collect()
    }
}

/// `WordError` / `WordException` names, deduplicated in first-seen order.
pub fn extract_exception_types(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    exception_re()
        .captures_iter(text)
        .filter_map(|cap| cap.get(1).map(|m| m.as_str().to_string()))
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.contains(&word)
}

fn is_trace_like(block: &str) -> bool {
    block.contains("Traceback")
        || block.contains("File \"")
        || block.lines().any(|l| l.trim_start().starts_with("at "))
        || file_line_re().is_match(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> DiagnosticSignals {
        SignalExtractor::default().extract(text, &[])
    }

    #[test]
    fn test_empty_text_yields_empty_signals() {
        let signals = extract("");
        assert!(signals.is_empty());
    }

    #[test]
    fn test_error_lines_extracted_in_order() {
        let text = "App crashes on load\n\
                    Uncaught TypeError: cannot read property 'x' of undefined\n\
                    later: error: could not compile `foo`\n\
                    Uncaught TypeError: cannot read property 'x' of undefined\n";
        let signals = extract(text);
        assert_eq!(
            signals.errors,
            vec![
                "TypeError: cannot read property 'x' of undefined".to_string(),
                "error: could not compile `foo`".to_string(),
            ]
        );
    }

    #[test]
    fn test_short_errors_dropped_and_long_truncated() {
        let long = format!("ValueError: {}", "x".repeat(400));
        let text = format!("error: bad\n{}", long);
        let signals = extract(&text);
        assert_eq!(signals.errors.len(), 1);
        assert_eq!(signals.errors[0].chars().count(), 300);
        assert!(signals.errors[0].starts_with("ValueError: "));
    }

    #[test]
    fn test_panic_line_is_an_error() {
        let signals =
            extract("thread 'main' panicked at 'index out of bounds', src/main.rs:4:5");
        assert_eq!(signals.errors.len(), 1);
        assert!(signals.errors[0].starts_with("thread 'main' panicked at"));
    }

    #[test]
    fn test_exception_types_deduplicated() {
        let signals = extract(
            "java.lang.NullPointerException at Foo\nTypeError here, and another TypeError. Error alone.",
        );
        assert_eq!(
            signals.exception_types,
            vec!["NullPointerException".to_string(), "TypeError".to_string()]
        );
    }

    #[test]
    fn test_stack_traces_from_fenced_blocks() {
        let text = "Here:\n```\nTraceback (most recent call last):\n  File \"a.py\", line 1\n```\n\
                    config:\n```toml\n[db]\npath = 1\n```\n\
                    ```\nError\n    at foo (app.js:10:3)\n```\n";
        let signals = extract(text);
        assert_eq!(signals.stack_traces.len(), 2);
        assert!(signals.stack_traces[0].starts_with("Traceback"));
        assert!(signals.stack_traces[1].contains("at foo"));
    }

    #[test]
    fn test_stack_traces_capped() {
        let block = "```\nat x (a.js:1:1)\n```\n";
        let signals = extract(&block.repeat(5));
        assert_eq!(signals.stack_traces.len(), 3);
    }

    #[test]
    fn test_technologies_union_of_vocabulary_and_labels() {
        let extractor = SignalExtractor::default();
        let labels = vec![
            "bug".to_string(),
            "React".to_string(),
            "Area: Build".to_string(),
        ];
        let signals = extractor.extract("Webpack build fails after upgrading react", &labels);
        assert_eq!(
            signals.technologies,
            vec![
                "webpack".to_string(),
                "react".to_string(),
                "bug".to_string(),
                "area: build".to_string()
            ]
        );
    }

    #[test]
    fn test_ignored_labels_are_opt_in() {
        let extractor = SignalExtractor::new(SignalTuning {
            ignored_labels: vec!["bug".to_string()],
            ..SignalTuning::default()
        });
        let labels = vec!["Bug".to_string(), "react".to_string()];
        let signals = extractor.extract("crash on start", &labels);
        assert_eq!(signals.technologies, vec!["react".to_string()]);
    }

    #[test]
    fn test_keywords_ranked_by_count_then_first_occurrence() {
        let signals = extract("render render widget crash widget render layout");
        let terms: Vec<&str> = signals.keywords.iter().map(|k| k.term.as_str()).collect();
        assert_eq!(terms, vec!["render", "widget", "crash", "layout"]);
        assert_eq!(signals.keywords[0].count, 3);
    }

    #[test]
    fn test_keywords_skip_stopwords_and_short_words() {
        let signals = extract("the and is it for with cache");
        let terms: Vec<&str> = signals.keywords.iter().map(|k| k.term.as_str()).collect();
        assert_eq!(terms, vec!["cache"]);
    }

    #[test]
    fn test_truncate_chars_is_char_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
