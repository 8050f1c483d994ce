use serde::{Deserialize, Serialize};

/// 分区条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryKind {
    City,
    Port,
    Country,
}

/// 分区映射条目 (地点模式 -> 分区)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneEntry {
    pub zone: String,
    pub kind: EntryKind,
    /// 城市/港口/国家代码 (如 MEL, CNSHA, CHN)
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
}

/// 分区表 - 条目按声明顺序保存 (模糊匹配平局时先声明者优先)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneTable {
    pub name: String,
    pub entries: Vec<ZoneEntry>,
}

impl ZoneTable {
    /// 表内出现的全部分区 (去重保序)
    pub fn zones(&self) -> indexmap::IndexSet<&str> {
        self.entries.iter().map(|e| e.zone.as_str()).collect()
    }
}

/// 匹配精度 - 声明顺序即优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Specificity {
    Exact,
    Fuzzy,
    Country,
}

/// 地理解析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMatch {
    pub zone: String,
    pub specificity: Specificity,
    /// 命中的条目代码
    pub matched: String,
}

/// 置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl From<Specificity> for Confidence {
    fn from(s: Specificity) -> Self {
        match s {
            Specificity::Exact => Confidence::High,
            Specificity::Fuzzy => Confidence::Medium,
            Specificity::Country => Confidence::Low,
        }
    }
}

impl Confidence {
    /// 多次解析取最低
    pub fn lowest<'a>(matches: impl IntoIterator<Item = &'a ZoneMatch>) -> Confidence {
        matches
            .into_iter()
            .map(|m| Confidence::from(m.specificity))
            .min()
            .unwrap_or(Confidence::High)
    }
}
