//! The fixed two-level taxonomy applied to topic members.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{normalize_major, CategoryAssignment};
use crate::{Error, Result};

/// Wire spelling of "no major category".
pub const UNCATEGORIZED: &str = "未分類";

const DEFAULT_MAJOR: &[&str] = &[
    "技術動向",
    "市場動向",
    "ビジネス",
    "製造技術",
    "研究開発",
    "デバイス",
    "設計",
    "材料",
    "半導体装置",
    "テスト・検査",
    "実装",
    "世の中の動き",
    "半導体/電子部品業界の動き",
    "その他",
    UNCATEGORIZED,
];

const DEFAULT_MINOR: &[&str] = &[
    "プロセス",
    "ロジック",
    "メモリ",
    "パワー半導体",
    "センサー",
    "アナログ",
    "FPGA",
    "MCU",
    "AI",
    "ファウンドリ",
    "IDM",
    "サプライチェーン",
    "M&A",
    "決算",
    "スタートアップ",
    "イベント",
    "ニュース一般",
    "その他",
    UNCATEGORIZED,
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    #[serde(default = "default_major")]
    pub major: Vec<String>,
    #[serde(default = "default_minor")]
    pub minor: Vec<String>,
}

fn default_major() -> Vec<String> {
    DEFAULT_MAJOR.iter().map(|s| s.to_string()).collect()
}

fn default_minor() -> Vec<String> {
    DEFAULT_MINOR.iter().map(|s| s.to_string()).collect()
}

impl Default for CategoryVocabulary {
    fn default() -> Self {
        Self {
            major: default_major(),
            minor: default_minor(),
        }
    }
}

impl CategoryVocabulary {
    pub fn is_major(&self, value: &str) -> bool {
        value == UNCATEGORIZED || self.major.iter().any(|m| m == value)
    }

    pub fn is_minor(&self, value: &str) -> bool {
        self.minor.iter().any(|m| m == value)
    }

    /// Checks an operator-supplied pair. Invalid values are rejected, never coerced.
    pub fn validate(&self, major: Option<&str>, minor: &BTreeSet<String>) -> Result<CategoryAssignment> {
        if let Some(value) = major {
            if !value.trim().is_empty() && !self.is_major(value) {
                return Err(Error::validation(format!("unknown major category: {}", value)));
            }
        }
        if let Some(unknown) = minor.iter().find(|m| !self.is_minor(m)) {
            return Err(Error::validation(format!("unknown minor category: {}", unknown)));
        }
        Ok(CategoryAssignment {
            major: normalize_major(major),
            minor: minor.clone(),
        })
    }

    /// Keeps only the vocabulary members of a classifier result.
    pub fn sanitize(&self, assignment: CategoryAssignment) -> CategoryAssignment {
        let major = assignment.major.filter(|m| self.is_major(m));
        let minor = assignment.minor.into_iter().filter(|m| self.is_minor(m)).collect();
        CategoryAssignment {
            major: normalize_major(major.as_deref()),
            minor,
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.major.is_empty() || self.minor.is_empty() {
            return Err(Error::Config(
                "categories.major and categories.minor must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
