//! `.terraformignore` rule engine.
//!
//! A package can carry a `.terraformignore` file at its root to exclude
//! paths from packing and bundling. The file is line oriented: blank lines
//! and `#` comments are skipped, a leading `!` marks a re-include rule, and
//! the rest of the line is a glob pattern. Rules apply in order and the
//! last matching rule wins.
//!
//! When the file is absent or unreadable a default ruleset applies: `.git/`
//! and `**/.terraform/` are excluded, with `**/.terraform/modules/`
//! re-included.
//!
//! Setting the `TF_IGNORE_DEBUG` environment variable to a path substring
//! makes the engine emit trace records for matching paths; the variable is
//! read once when a ruleset is built.

mod rule;

use std::env;
use std::fs::File;
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::path::Path;

use crate::error::IgnoreError;

use rule::Rule;

/// The name of the ignore file looked up at a package root.
pub const IGNORE_FILE_NAME: &str = ".terraformignore";

/// The environment variable enabling per-path trace output.
const DEBUG_ENV: &str = "TF_IGNORE_DEBUG";

/// The outcome of testing one path against a ruleset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExcludesResult {
    /// Whether the path is excluded by the ruleset.
    pub excluded: bool,
    /// True when no later rule could have flipped the decision, so a caller
    /// walking a tree may skip an excluded directory's subtree without
    /// consulting the ruleset for its children.
    pub dominating: bool,
}

/// An ordered set of ignore rules.
#[derive(Debug)]
pub struct Ruleset {
    rules: Vec<Rule>,
    invalid: Vec<String>,
    debug_substr: Option<String>,
}

impl Ruleset {
    /// The ruleset applied when a package has no usable ignore file.
    pub fn default_rules() -> Ruleset {
        Ruleset::from_rules(vec![
            Rule::new(".git/".to_string(), false),
            Rule::new("**/.terraform/".to_string(), false),
            Rule::new("**/.terraform/modules/".to_string(), true),
        ])
    }

    /// Parses ignore rules from a reader holding `.terraformignore`
    /// content.
    ///
    /// Individual patterns that fail to compile do not fail the parse; they
    /// are recorded and reported through [`Ruleset::error`] while the rest
    /// of the ruleset stays usable.
    pub fn parse(reader: impl Read) -> std::io::Result<Ruleset> {
        let mut rules = Vec::new();
        for line in BufReader::new(reader).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (pattern, negated) = match line.strip_prefix('!') {
                Some(rest) => (rest, true),
                None => (line, false),
            };
            if pattern.is_empty() {
                continue;
            }
            rules.push(Rule::new(pattern.to_string(), negated));
        }
        Ok(Ruleset::from_rules(rules))
    }

    /// Loads the ignore rules for the package rooted at `dir`, falling back
    /// to the default ruleset when no `.terraformignore` file is present or
    /// it cannot be read.
    pub fn load_package_ignore_rules(dir: &Path) -> Ruleset {
        let path = dir.join(IGNORE_FILE_NAME);
        match File::open(&path) {
            Ok(file) => match Ruleset::parse(file) {
                Ok(ruleset) => ruleset,
                Err(err) => {
                    tracing::debug!(
                        path = %path.display(),
                        error = %err,
                        "error reading ignore file, default exclusions will apply",
                    );
                    Ruleset::default_rules()
                }
            },
            Err(err) => {
                if err.kind() != ErrorKind::NotFound {
                    tracing::debug!(
                        path = %path.display(),
                        error = %err,
                        "error opening ignore file, default exclusions will apply",
                    );
                }
                Ruleset::default_rules()
            }
        }
    }

    fn from_rules(mut rules: Vec<Rule>) -> Ruleset {
        // A rule dominates when no rule after it is a negation: once it
        // matches positively, nothing later can re-include the path.
        let mut negation_later = false;
        for rule in rules.iter_mut().rev() {
            rule.dominating = !negation_later;
            negation_later = negation_later || rule.negated;
        }

        let invalid = rules
            .iter()
            .filter(|r| !r.is_valid())
            .map(|r| r.pattern.clone())
            .collect();

        Ruleset {
            rules,
            invalid,
            debug_substr: env::var(DEBUG_ENV).ok().filter(|s| !s.is_empty()),
        }
    }

    /// Decides whether the given slash-separated relative path is excluded.
    ///
    /// Directories may be tested both bare and with a trailing `/`; rules
    /// written for directories only match the latter form.
    pub fn excludes(&self, path: &str) -> ExcludesResult {
        let debug = self
            .debug_substr
            .as_deref()
            .is_some_and(|substr| path.contains(substr));

        let mut matched = false;
        let mut dominating = false;
        for rule in &self.rules {
            if !rule.matches(path) {
                continue;
            }
            matched = !rule.negated;
            dominating = rule.dominating;
            if debug {
                tracing::trace!(
                    path,
                    pattern = %rule.pattern,
                    negated = rule.negated,
                    excluded = matched,
                    "ignore rule matched",
                );
            }
            if matched && rule.dominating {
                // No later rule can re-include this path.
                break;
            }
        }
        ExcludesResult {
            excluded: matched,
            dominating,
        }
    }

    /// Returns an error describing any patterns that failed to compile, or
    /// `None` when every rule is usable. Callers that can tolerate a
    /// best-effort ruleset may ignore this.
    pub fn error(&self) -> Option<IgnoreError> {
        if self.invalid.is_empty() {
            None
        } else {
            Some(IgnoreError::InvalidPatterns {
                patterns: self.invalid.clone(),
            })
        }
    }

    /// The number of rules in the set.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
