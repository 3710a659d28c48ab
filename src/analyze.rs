//! Per-issue analysis: signals, search, precedents, verdict.

use std::sync::Arc;

use tracing::debug;
use triage_harness_core::external::KnowledgeBase;
use triage_harness_core::models::{Issue, IssueAnalysis};
use triage_harness_core::precedent::PrecedentFinder;
use triage_harness_core::run::QueryCounters;
use triage_harness_core::signals::SignalExtractor;
use triage_harness_core::synthesize::{SynthesisInput, Synthesizer};
use triage_harness_core::tuning::ScoringTuning;

use crate::correlate::SearchOrchestrator;
use crate::pacing::Pacer;

pub struct IssueAnalyzer {
    extractor: SignalExtractor,
    search: SearchOrchestrator,
    precedents: PrecedentFinder,
    synthesizer: Synthesizer,
}

impl IssueAnalyzer {
    pub fn new(
        scoring: &ScoringTuning,
        knowledge: Arc<dyn KnowledgeBase>,
        pacer: Arc<Pacer>,
        fetch_responses: bool,
    ) -> Self {
        Self {
            extractor: SignalExtractor::new(scoring.signals.clone()),
            search: SearchOrchestrator::new(
                knowledge,
                pacer,
                scoring.strategies.clone(),
                fetch_responses,
            ),
            precedents: PrecedentFinder::new(scoring.precedents.clone()),
            synthesizer: Synthesizer::new(scoring.synthesis.clone()),
        }
    }

    /// Analyze `issue` against the knowledge base and the fetched `corpus`.
    ///
    /// Never fails: collaborator errors degrade to fewer candidates.
    pub async fn analyze(&self, issue: &Issue, corpus: &[Issue]) -> (IssueAnalysis, QueryCounters) {
        let signals = self.extractor.extract_issue(issue);
        let outcome = self.search.search(&signals).await;
        let precedents = self.precedents.find(issue, corpus);

        let verdict = self.synthesizer.synthesize(&SynthesisInput {
            signals: &signals,
            candidates: &outcome.candidates,
            precedents: &precedents,
            engagement: issue.engagement(),
        });

        debug!(
            issue = issue.number,
            errors = signals.errors.len(),
            candidates = outcome.candidates.len(),
            precedents = precedents.len(),
            confidence = verdict.confidence,
            "issue analyzed"
        );

        let analysis = IssueAnalysis {
            issue: issue.clone(),
            signals,
            candidates: outcome.candidates,
            precedents,
            verdict,
        };
        (analysis, outcome.counters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_harness_core::external::memory::InMemoryKnowledgeBase;
    use triage_harness_core::models::{
        Complexity, IssueState, Reactions, SearchCandidate, Solvability,
    };

    fn make_issue(number: u64, title: &str, body: &str, labels: &[&str], state: IssueState) -> Issue {
        Issue {
            number,
            title: title.to_string(),
            body: body.to_string(),
            state,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            comments: vec![],
            comment_count: 3,
            reactions: Reactions::default(),
            created_at: chrono::Utc::now(),
            closed_at: None,
            url: format!("https://github.com/acme/widgets/issues/{}", number),
        }
    }

    #[tokio::test]
    async fn test_analysis_combines_all_stages() {
        let candidate = SearchCandidate {
            id: "42".to_string(),
            title: "Cannot read property of undefined".to_string(),
            tags: vec!["reactjs".to_string()],
            score: 30,
            view_count: 5000,
            answer_count: 4,
            is_answered: true,
            link: "https://stackoverflow.com/q/42".to_string(),
            best_response: None,
            relevance_score: 0,
            match_reason: String::new(),
            strategy: None,
        };
        let kb = Arc::new(InMemoryKnowledgeBase::new().with_fallback(vec![candidate]));
        let analyzer = IssueAnalyzer::new(
            &ScoringTuning::default(),
            kb,
            Arc::new(Pacer::unpaced("knowledge")),
            false,
        );

        let target = make_issue(
            1,
            "Dashboard crashes on render",
            "TypeError: cannot read property 'x' of undefined\nusing react",
            &["bug", "react"],
            IssueState::Open,
        );
        let corpus = vec![
            target.clone(),
            make_issue(2, "Dashboard crashes after update", "", &["bug", "react"], IssueState::Closed),
        ];

        let (analysis, counters) = analyzer.analyze(&target, &corpus).await;
        assert_eq!(analysis.issue.number, 1);
        assert!(analysis.signals.technologies.contains(&"react".to_string()));
        assert_eq!(analysis.candidates.len(), 1);
        assert_eq!(analysis.candidates[0].relevance_score, 95);
        assert_eq!(analysis.precedents.len(), 1);
        assert_eq!(analysis.precedents[0].number, 2);
        assert_eq!(analysis.verdict.solvability, Solvability::High);
        assert_eq!(analysis.verdict.complexity, Complexity::Low);
        assert!(counters.issued >= 1);
        assert_eq!(counters.failed, 0);
    }
}
