//! 日记输入一致性检查
//!
//! 判断当天的单条日记是否仍与综合日记生成时的快照一致。
//! 比较忽略顺序，也忽略空白差异（连续空白折叠为一个空格并去掉首尾空白）。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// 原始输入与生成日记
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiaryInputPair {
    #[serde(default)]
    pub raw_input: String,
    #[serde(default, alias = "generated_diary")]
    pub diary: String,
}

impl DiaryInputPair {
    pub fn new(raw_input: impl Into<String>, diary: impl Into<String>) -> Self {
        Self {
            raw_input: raw_input.into(),
            diary: diary.into(),
        }
    }

    /// 排序键：拼接后的规范化文本，相同时再按各字段比较
    fn sort_key(&self) -> (String, String, String) {
        (
            normalize(&format!("{}{}", self.raw_input, self.diary)),
            normalize(&self.raw_input),
            normalize(&self.diary),
        )
    }
}

/// 连续空白折叠为一个空格并去掉首尾空白
pub fn normalize(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text, " ").trim().to_string()
}

fn sorted(pairs: &[DiaryInputPair]) -> Vec<&DiaryInputPair> {
    let mut keyed: Vec<_> = pairs.iter().map(|p| (p.sort_key(), p)).collect();
    keyed.sort_by(|(a, _), (b, _)| a.cmp(b));
    keyed.into_iter().map(|(_, p)| p).collect()
}

/// 两组输入是否表示同一批日记
pub fn is_same_diary_inputs(current: &[DiaryInputPair], saved: &[DiaryInputPair]) -> bool {
    if current.len() != saved.len() {
        return false;
    }

    sorted(current)
        .into_iter()
        .zip(sorted(saved))
        .all(|(a, b)| {
            normalize(&a.raw_input) == normalize(&b.raw_input)
                && normalize(&a.diary) == normalize(&b.diary)
        })
}
