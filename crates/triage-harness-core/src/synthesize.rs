//! Verdict synthesis.
//!
//! A pure function of the extracted signals, ranked candidates, ranked
//! precedents, and engagement metrics. It never fails: sparse inputs fall
//! back to the base values in [`SynthesisTuning`].

use crate::models::{
    Complexity, DiagnosticSignals, EffortBand, Engagement, PrecedentIssue, SearchCandidate,
    Solvability, Verdict,
};
use crate::signals::truncate_chars;
use crate::tuning::SynthesisTuning;

/// Inputs to [`Synthesizer::synthesize`].
#[derive(Debug, Clone, Copy)]
pub struct SynthesisInput<'a> {
    pub signals: &'a DiagnosticSignals,
    pub candidates: &'a [SearchCandidate],
    pub precedents: &'a [PrecedentIssue],
    pub engagement: Engagement,
}

#[derive(Debug, Clone, Default)]
pub struct Synthesizer {
    tuning: SynthesisTuning,
}

impl Synthesizer {
    pub fn new(tuning: SynthesisTuning) -> Self {
        Self { tuning }
    }

    pub fn synthesize(&self, input: &SynthesisInput<'_>) -> Verdict {
        let hours = self.effort_hours(input);
        Verdict {
            complexity: self.complexity(input),
            solvability: self.solvability(input),
            confidence: self.confidence(input),
            estimated_effort_hours: hours,
            effort: effort_band(hours),
            steps: self.steps(input),
        }
    }

    fn is_busy(&self, engagement: Engagement) -> bool {
        engagement.comment_count > self.tuning.busy_comment_threshold
    }

    fn has_strong_answer(&self, candidates: &[SearchCandidate]) -> bool {
        candidates
            .iter()
            .any(|c| c.is_answered && c.score >= self.tuning.strong_answer_popularity)
    }

    fn complexity(&self, input: &SynthesisInput<'_>) -> Complexity {
        let t = &self.tuning;
        let mut score = t.complexity_base;
        if input.candidates.is_empty() {
            score += t.no_candidates_penalty;
        }
        if !input.candidates.iter().any(|c| c.is_answered) {
            score += t.no_answered_penalty;
        }
        if self.is_busy(input.engagement) {
            score += t.busy_discussion_penalty;
        }
        if input.precedents.is_empty() {
            score += t.no_precedents_penalty;
        }

        if score <= t.low_complexity_max {
            Complexity::Low
        } else if score <= t.medium_complexity_max {
            Complexity::Medium
        } else {
            Complexity::High
        }
    }

    fn solvability(&self, input: &SynthesisInput<'_>) -> Solvability {
        if self.has_strong_answer(input.candidates) {
            Solvability::High
        } else if input.candidates.iter().any(|c| c.is_answered) || !input.precedents.is_empty() {
            Solvability::Medium
        } else {
            Solvability::Low
        }
    }

    fn confidence(&self, input: &SynthesisInput<'_>) -> u8 {
        let t = &self.tuning;
        let answered = input.candidates.iter().filter(|c| c.is_answered).count() as i32;
        let popular = input
            .candidates
            .iter()
            .filter(|c| c.score >= t.popular_threshold)
            .count() as i32;
        let precedents = input.precedents.len() as i32;
        let candidates = input.candidates.len() as i32;

        let confidence = t.confidence_base
            + (answered * t.answered_bonus).min(t.answered_cap)
            + (popular * t.popular_bonus).min(t.popular_cap)
            + (precedents * t.precedent_bonus).min(t.precedent_cap)
            + (candidates * t.candidate_bonus).min(t.candidate_cap);

        confidence.clamp(0, 100) as u8
    }

    fn effort_hours(&self, input: &SynthesisInput<'_>) -> u8 {
        let t = &self.tuning;
        let mut hours = t.effort_base_hours;
        if self.has_strong_answer(input.candidates) {
            hours -= t.strong_answer_hours;
        }
        if !input.precedents.is_empty() {
            hours -= t.precedent_hours;
        }
        if self.is_busy(input.engagement) || input.candidates.is_empty() {
            hours += t.uncertainty_hours;
        }
        let (min, max) = (t.min_hours.max(1), t.max_hours.clamp(1, 40));
        hours.clamp(min.min(max), max) as u8
    }

    fn steps(&self, input: &SynthesisInput<'_>) -> Vec<String> {
        let mut steps = vec!["Review the issue report and reproduce the failure".to_string()];

        if input.candidates.is_empty() {
            if let Some(error) = input.signals.errors.first() {
                steps.push(format!(
                    "Investigate the reported error: {}",
                    truncate_chars(error, 120)
                ));
            }
        }

        if let Some(top) = input.candidates.first() {
            steps.push(format!("Check the top candidate: {} ({})", top.title, top.link));
        }

        if let Some(answered) = input
            .candidates
            .iter()
            .find(|c| c.is_answered && c.best_response.is_some())
        {
            steps.push(format!(
                "Apply the accepted-answer pattern from {}",
                answered.link
            ));
        }

        if let Some(nearest) = input.precedents.first() {
            steps.push(format!(
                "Review precedent issue #{}: {}",
                nearest.number, nearest.title
            ));
        }

        steps.push("Add a regression test covering the fix".to_string());
        steps.push("Document the fix and link related issues".to_string());
        steps
    }
}

/// Map an hour estimate to its label band.
pub fn effort_band(hours: u8) -> EffortBand {
    match hours {
        0..=4 => EffortBand::Quick,
        5..=8 => EffortBand::Standard,
        9..=16 => EffortBand::Moderate,
        _ => EffortBand::Complex,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Strategy;

    fn make_candidate(id: &str, answered: bool, score: i64, response: bool) -> SearchCandidate {
        SearchCandidate {
            id: id.to_string(),
            title: format!("Question {}", id),
            tags: vec![],
            score,
            view_count: 100,
            answer_count: if answered { 1 } else { 0 },
            is_answered: answered,
            link: format!("https://stackoverflow.com/q/{}", id),
            best_response: response.then(|| "Use the thing".to_string()),
            relevance_score: 95,
            match_reason: "exact error match".to_string(),
            strategy: Some(Strategy::ExactError),
        }
    }

    fn make_precedent(number: u64) -> PrecedentIssue {
        PrecedentIssue {
            number,
            title: format!("Old issue {}", number),
            url: String::new(),
            labels: vec![],
            comment_count: 4,
            closed_at: None,
            similarity_score: 45,
            shared_words: vec![],
            shared_labels: vec![],
        }
    }

    fn verdict(
        signals: &DiagnosticSignals,
        candidates: &[SearchCandidate],
        precedents: &[PrecedentIssue],
        comments: u32,
    ) -> Verdict {
        Synthesizer::default().synthesize(&SynthesisInput {
            signals,
            candidates,
            precedents,
            engagement: Engagement {
                comment_count: comments,
                reactions: 0,
            },
        })
    }

    #[test]
    fn test_sparse_input_is_high_complexity_low_confidence() {
        let v = verdict(&DiagnosticSignals::default(), &[], &[], 0);
        assert_eq!(v.complexity, Complexity::High);
        assert_eq!(v.solvability, Solvability::Low);
        assert!(v.confidence <= 50);
        assert_eq!(v.estimated_effort_hours, 12);
        assert_eq!(v.effort, EffortBand::Moderate);
        assert_eq!(
            v.steps,
            vec![
                "Review the issue report and reproduce the failure".to_string(),
                "Add a regression test covering the fix".to_string(),
                "Document the fix and link related issues".to_string(),
            ]
        );
    }

    #[test]
    fn test_strong_answer_and_precedent() {
        let candidates = vec![
            make_candidate("1", true, 42, true),
            make_candidate("2", false, 3, false),
        ];
        let precedents = vec![make_precedent(7)];
        let v = verdict(&DiagnosticSignals::default(), &candidates, &precedents, 2);

        assert_eq!(v.complexity, Complexity::Low);
        assert_eq!(v.solvability, Solvability::High);
        // 50 + 10 answered + 5 popular + 5 precedent + 4 candidates
        assert_eq!(v.confidence, 74);
        // 8 - 4 - 2
        assert_eq!(v.estimated_effort_hours, 2);
        assert_eq!(v.effort, EffortBand::Quick);
        assert_eq!(v.steps.len(), 6);
        assert!(v.steps[1].starts_with("Check the top candidate: Question 1"));
        assert!(v.steps[2].starts_with("Apply the accepted-answer pattern"));
        assert_eq!(v.steps[3], "Review precedent issue #7: Old issue 7");
    }

    #[test]
    fn test_medium_solvability_from_precedent_only() {
        let precedents = vec![make_precedent(3)];
        let v = verdict(&DiagnosticSignals::default(), &[], &precedents, 0);
        assert_eq!(v.solvability, Solvability::Medium);
        // base 1 + no candidates 2 + no answered 1 = 4
        assert_eq!(v.complexity, Complexity::High);
    }

    #[test]
    fn test_busy_discussion_raises_effort() {
        let candidates = vec![make_candidate("1", false, 0, false)];
        let v = verdict(&DiagnosticSignals::default(), &candidates, &[], 25);
        // base 8 + 4 uncertainty
        assert_eq!(v.estimated_effort_hours, 12);
        assert_eq!(v.solvability, Solvability::Low);
    }

    #[test]
    fn test_error_step_only_without_candidates() {
        let signals = DiagnosticSignals {
            errors: vec!["TypeError: x is undefined".to_string()],
            ..DiagnosticSignals::default()
        };
        let v = verdict(&signals, &[], &[], 0);
        assert_eq!(
            v.steps[1],
            "Investigate the reported error: TypeError: x is undefined"
        );

        let candidates = vec![make_candidate("1", false, 0, false)];
        let v = verdict(&signals, &candidates, &[], 0);
        assert!(v.steps.iter().all(|s| !s.starts_with("Investigate")));
    }

    #[test]
    fn test_bounds_hold_for_extreme_inputs() {
        let many: Vec<SearchCandidate> = (0..50)
            .map(|i| make_candidate(&i.to_string(), true, 1000, true))
            .collect();
        let precedents: Vec<PrecedentIssue> = (0..50).map(make_precedent).collect();
        let v = verdict(&DiagnosticSignals::default(), &many, &precedents, 1000);
        assert!(v.confidence <= 100);
        assert!((1..=40).contains(&v.estimated_effort_hours));

        let harsh = SynthesisTuning {
            confidence_base: -500,
            effort_base_hours: -30,
            ..SynthesisTuning::default()
        };
        let v = Synthesizer::new(harsh).synthesize(&SynthesisInput {
            signals: &DiagnosticSignals::default(),
            candidates: &many,
            precedents: &precedents,
            engagement: Engagement::default(),
        });
        assert_eq!(v.confidence, 0);
        assert_eq!(v.estimated_effort_hours, 1);
    }

    #[test]
    fn test_effort_bands() {
        assert_eq!(effort_band(1), EffortBand::Quick);
        assert_eq!(effort_band(4), EffortBand::Quick);
        assert_eq!(effort_band(8), EffortBand::Standard);
        assert_eq!(effort_band(16), EffortBand::Moderate);
        assert_eq!(effort_band(17), EffortBand::Complex);
        assert_eq!(effort_band(40), EffortBand::Complex);
    }
}
