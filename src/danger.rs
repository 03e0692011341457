//! Danger classification for step descriptions
//!
//! Maps free-form step text to a set of dangerous-action categories.
//! Classification is pure and deterministic: each category carries a list
//! of indicative patterns, and a category is included when any of its
//! patterns match. Absence of match yields an empty set.

use std::collections::HashSet;

use regex::{Regex, RegexSet};
use serde::{Deserialize, Serialize};

/// Dangerous-action category
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DangerCategory {
    /// Deleting files or directories
    FileDeletion,
    /// Forced version-control pushes
    ForcePush,
    /// Publishing a package to a registry
    PackagePublication,
    /// Mutating environment variables
    EnvironmentMutation,
    /// Outbound network call to a non-local host
    OutboundNetwork,
    /// Destructive data-store statements
    DestructiveDatabase,
}

impl DangerCategory {
    /// All categories, in display order
    pub const ALL: [DangerCategory; 6] = [
        DangerCategory::FileDeletion,
        DangerCategory::ForcePush,
        DangerCategory::PackagePublication,
        DangerCategory::EnvironmentMutation,
        DangerCategory::OutboundNetwork,
        DangerCategory::DestructiveDatabase,
    ];

    /// Human-readable label for UI messaging
    pub fn label(&self) -> &'static str {
        match self {
            DangerCategory::FileDeletion => "file deletion",
            DangerCategory::ForcePush => "forced push",
            DangerCategory::PackagePublication => "package publication",
            DangerCategory::EnvironmentMutation => "environment variable mutation",
            DangerCategory::OutboundNetwork => "outbound network call",
            DangerCategory::DestructiveDatabase => "destructive database statement",
        }
    }
}

impl std::fmt::Display for DangerCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

const FILE_DELETION_PATTERNS: &[&str] = &[
    r"\brm\s+-[a-z]*[rf]",
    r"\brmdir\b",
    r"\bunlink\b",
    r"delete\s+(?:all\s+|the\s+)?(?:files?|folders?|director)",
    r"remove\s+(?:all\s+|the\s+)?(?:files?|folders?|director)",
];

const FORCE_PUSH_PATTERNS: &[&str] = &[
    r"push\s+--force\b",
    r"push\s+--force-with-lease\b",
    r"push\s+-f\b",
    r"force[\s-]push",
];

const PACKAGE_PUBLICATION_PATTERNS: &[&str] = &[
    r"\bnpm\s+publish\b",
    r"\byarn\s+publish\b",
    r"\bcargo\s+publish\b",
    r"\btwine\s+upload\b",
    r"\bgem\s+push\b",
    r"publish\s+(?:the\s+)?(?:package|crate|module|gem)",
];

const ENVIRONMENT_MUTATION_PATTERNS: &[&str] = &[
    r"\bexport\s+[a-z_][a-z0-9_]*=",
    r"\bsetenv\b",
    r"\bunset\s+[a-z_]",
    r"set\s+(?:the\s+)?environment\s+variable",
    r"modify\s+(?:the\s+)?environment",
    r"\.env\b",
];

const DESTRUCTIVE_DATABASE_PATTERNS: &[&str] = &[
    r"\bdrop\s+(?:table|database|schema|collection)\b",
    r"\btruncate\s+table\b",
    r"\bdelete\s+from\b",
];

const NETWORK_HINT_PATTERNS: &[&str] = &[
    r"\bcurl\s",
    r"\bwget\s",
    r"\bsend\s+(?:a\s+|an\s+)?(?:http\s+)?request\b",
    r"\bapi\s+call\b",
    r"\bwebhook\b",
    r"\bupload\s+to\b",
];

/// Pattern-based danger classifier
///
/// Compiles its pattern lists once at construction; `classify` is pure.
pub struct DangerClassifier {
    rules: Vec<(DangerCategory, RegexSet)>,
    url_host: Regex,
    network_hints: RegexSet,
}

impl DangerClassifier {
    pub fn new() -> Self {
        let compile = |patterns: &[&str]| {
            RegexSet::new(patterns).expect("danger patterns are valid regexes")
        };

        Self {
            rules: vec![
                (DangerCategory::FileDeletion, compile(FILE_DELETION_PATTERNS)),
                (DangerCategory::ForcePush, compile(FORCE_PUSH_PATTERNS)),
                (
                    DangerCategory::PackagePublication,
                    compile(PACKAGE_PUBLICATION_PATTERNS),
                ),
                (
                    DangerCategory::EnvironmentMutation,
                    compile(ENVIRONMENT_MUTATION_PATTERNS),
                ),
                (
                    DangerCategory::DestructiveDatabase,
                    compile(DESTRUCTIVE_DATABASE_PATTERNS),
                ),
            ],
            url_host: Regex::new(r"https?://([a-z0-9.\-:\[\]]+)")
                .expect("url host pattern is a valid regex"),
            network_hints: RegexSet::new(NETWORK_HINT_PATTERNS)
                .expect("network hint patterns are valid regexes"),
        }
    }

    /// Classify a step description into matched danger categories
    pub fn classify(&self, description: &str) -> HashSet<DangerCategory> {
        let text = description.to_lowercase();
        let mut matched = HashSet::new();

        for (category, patterns) in &self.rules {
            if patterns.is_match(&text) {
                matched.insert(*category);
            }
        }

        if self.mentions_outbound_network(&text) {
            matched.insert(DangerCategory::OutboundNetwork);
        }

        matched
    }

    fn mentions_outbound_network(&self, text: &str) -> bool {
        let mut saw_url = false;
        for caps in self.url_host.captures_iter(text) {
            saw_url = true;
            if !is_local_host(&caps[1]) {
                return true;
            }
        }
        if saw_url {
            // Only local URLs present
            return false;
        }

        self.network_hints.is_match(text)
            && !text.contains("localhost")
            && !text.contains("127.0.0.1")
    }
}

impl Default for DangerClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn is_local_host(host: &str) -> bool {
    // Strip a port suffix; bracketed IPv6 keeps its brackets in the capture.
    let bare = if let Some(end) = host.strip_prefix('[').and_then(|h| h.split(']').next()) {
        end
    } else {
        host.split(':').next().unwrap_or(host)
    };

    bare == "localhost" || bare == "0.0.0.0" || bare == "::1" || bare.starts_with("127.")
}
