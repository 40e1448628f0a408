//! Intelligent edge proposal. Pattern rules over task titles, descriptions, types,
//! and file paths emit scored edge candidates; proposals at or above the auto-apply
//! threshold go through [`DependencyGraph::add_dependency`], which still enforces
//! acyclicity, and the rest are returned for review.

use crate::edge::DependencyType;
use crate::graph::DependencyGraph;
use itertools::Itertools;
use overseer_core::identifier::TaskId;
use overseer_core::task::Task;
use std::collections::{BTreeSet, HashSet};

/// Proposals at or above this confidence may be applied without review
pub const AUTO_APPLY_THRESHOLD: f64 = 0.8;

/// One proposed edge with its confidence and the rule that produced it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DependencyProposal {
    /// The dependent task
    pub from: TaskId,
    /// The dependency it should wait on
    pub to: TaskId,
    #[serde(rename = "type")]
    pub dep_type: DependencyType,
    /// In `[0, 1]`
    pub confidence: f64,
    pub reason: String,
}

/// Result of applying a proposal batch to a graph
#[derive(Debug, Clone, Default)]
pub struct AppliedProposals {
    pub applied: Vec<DependencyProposal>,
    /// Proposals below the threshold, or refused by the graph (duplicate, cycle)
    pub skipped: Vec<(DependencyProposal, String)>,
}

/// A keyword pattern: upstream vocabulary on the dependency side, downstream
/// vocabulary on the dependent side
struct KeywordRule {
    dependency: &'static [&'static str],
    dependent: &'static [&'static str],
    dep_type: DependencyType,
    confidence: f64,
    reason: &'static str,
}

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        dependency: &["setup", "install", "configure", "scaffold", "init"],
        dependent: &["implement", "build", "create", "develop", "add"],
        dep_type: DependencyType::Task,
        confidence: 0.7,
        reason: "setup work precedes implementation",
    },
    KeywordRule {
        dependency: &["implement", "build", "create", "develop"],
        dependent: &["test", "verify", "validate"],
        dep_type: DependencyType::Task,
        confidence: 0.85,
        reason: "implementation precedes testing",
    },
    KeywordRule {
        dependency: &["database", "db", "schema", "migration"],
        dependent: &["api", "endpoint", "service", "handler"],
        dep_type: DependencyType::Task,
        confidence: 0.8,
        reason: "data layer precedes the api that reads it",
    },
    KeywordRule {
        dependency: &["environment", "infrastructure", "provision", "cluster"],
        dependent: &["deploy", "release", "rollout"],
        dep_type: DependencyType::Environment,
        confidence: 0.8,
        reason: "an environment must exist before anything deploys to it",
    },
];

/// Propose edges over a set of tasks by pattern rules
pub fn propose_dependencies(tasks: &[Task]) -> Vec<DependencyProposal> {
    let mut proposals = vec![];
    let mut seen = HashSet::new();
    let token_sets: Vec<BTreeSet<String>> = tasks.iter().map(tokens).collect();

    for ((i, dependency), (j, dependent)) in tasks
        .iter()
        .enumerate()
        .cartesian_product(tasks.iter().enumerate())
    {
        if i == j {
            continue;
        }
        let mut push = |proposal: DependencyProposal| {
            let key = (
                proposal.from.clone(),
                proposal.to.clone(),
                proposal.dep_type,
            );
            if seen.insert(key) {
                proposals.push(proposal);
            }
        };

        for rule in KEYWORD_RULES {
            if contains_any(&token_sets[i], rule.dependency)
                && contains_any(&token_sets[j], rule.dependent)
            {
                push(DependencyProposal {
                    from: dependent.id.clone(),
                    to: dependency.id.clone(),
                    dep_type: rule.dep_type,
                    confidence: rule.confidence,
                    reason: rule.reason.to_string(),
                });
            }
        }

        // a task typed as a framework gates consumers that mention it by name
        if dependency.task_type.as_deref() == Some("framework")
            && contains_any(
                &token_sets[j],
                &tokens_of(&dependency.title)
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>(),
            )
        {
            push(DependencyProposal {
                from: dependent.id.clone(),
                to: dependency.id.clone(),
                dep_type: DependencyType::Framework,
                confidence: 0.75,
                reason: "consumer references the framework task by name".to_string(),
            });
        }

        // shared file paths order the earlier-created task first
        if i < j {
            let shared = dependency
                .file_paths
                .iter()
                .find(|path| dependent.file_paths.contains(path));
            if let Some(path) = shared {
                push(DependencyProposal {
                    from: dependent.id.clone(),
                    to: dependency.id.clone(),
                    dep_type: DependencyType::Import,
                    confidence: 0.6,
                    reason: format!("both tasks touch {}", path),
                });
            }
        }
    }
    proposals
}

impl DependencyGraph {
    /// Apply the proposals at or above `threshold` through the cycle-checked edge
    /// mutation; everything else lands in `skipped` with the reason.
    pub fn apply_proposals(
        &mut self,
        proposals: Vec<DependencyProposal>,
        threshold: f64,
    ) -> AppliedProposals {
        let mut outcome = AppliedProposals::default();
        for proposal in proposals {
            if proposal.confidence < threshold {
                outcome
                    .skipped
                    .push((proposal, "below confidence threshold".to_string()));
                continue;
            }
            let result = self.add_dependency(
                &proposal.from.clone(),
                &proposal.to.clone(),
                proposal.dep_type,
                1.0,
                false,
                Some(proposal.reason.clone()),
            );
            match result {
                Ok(()) => outcome.applied.push(proposal),
                Err(e) => {
                    debug!("skipping proposed edge {}->{}: {}", proposal.from, proposal.to, e);
                    outcome.skipped.push((proposal, e.to_string()));
                }
            }
        }
        outcome
    }
}

fn tokens(task: &Task) -> BTreeSet<String> {
    let mut set = tokens_of(&task.title);
    set.extend(tokens_of(&task.description));
    set
}

fn tokens_of(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.to_lowercase())
        .collect()
}

fn contains_any(tokens: &BTreeSet<String>, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| tokens.contains(*keyword))
}
