use crate::models::{normalize_text, EntryKind, Locality, Specificity, ZoneEntry, ZoneMatch, ZoneTable};

/// 模糊匹配最短文本长度 (避免 "SA"/"WA" 之类短码误命中)
const MIN_FUZZY_LEN: usize = 3;

/// 国家名称/代码 -> ISO-2
const COUNTRY_ALIASES: &[(&str, &str)] = &[
    ("AUSTRALIA", "AU"),
    ("AUS", "AU"),
    ("CHINA", "CN"),
    ("CHN", "CN"),
    ("PRC", "CN"),
    ("HONG KONG", "HK"),
    ("HKG", "HK"),
    ("ITALY", "IT"),
    ("ITALIA", "IT"),
    ("ITA", "IT"),
    ("GERMANY", "DE"),
    ("DEUTSCHLAND", "DE"),
    ("DEU", "DE"),
    ("NETHERLANDS", "NL"),
    ("HOLLAND", "NL"),
    ("NEDERLAND", "NL"),
    ("NLD", "NL"),
    ("UNITED STATES", "US"),
    ("USA", "US"),
    ("UNITED KINGDOM", "GB"),
    ("UK", "GB"),
    ("GBR", "GB"),
    ("FRANCE", "FR"),
    ("FRA", "FR"),
    ("SPAIN", "ES"),
    ("ESP", "ES"),
    ("JAPAN", "JP"),
    ("JPN", "JP"),
    ("NEW ZEALAND", "NZ"),
    ("NZL", "NZ"),
    ("SINGAPORE", "SG"),
    ("SGP", "SG"),
];

/// 国家文本归一为 ISO-2 (未知名称原样返回大写形式)
pub fn canonical_country(text: &str) -> String {
    let norm = normalize_text(text);
    COUNTRY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == norm)
        .map(|(_, code)| code.to_string())
        .unwrap_or(norm)
}

/// 地理解析器: 精确 -> 别名模糊 -> 国家兜底，首个命中即返回
///
/// 纯函数: 相同地点 + 相同分区表总是得到相同结果。
pub struct GeoResolver<'a> {
    table: &'a ZoneTable,
}

impl<'a> GeoResolver<'a> {
    pub fn new(table: &'a ZoneTable) -> Self {
        Self { table }
    }

    pub fn table_name(&self) -> &str {
        &self.table.name
    }

    pub fn resolve(&self, locality: &Locality) -> Option<ZoneMatch> {
        let texts: Vec<String> = [&locality.port, &locality.city]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .map(normalize_text)
            .filter(|t| !t.is_empty())
            .collect();

        texts
            .iter()
            .find_map(|t| self.exact(t))
            .or_else(|| texts.iter().find_map(|t| self.fuzzy(t)))
            .or_else(|| self.country(locality))
    }

    /// 单个自由文本 (如 "Shanghai, China")
    pub fn resolve_text(&self, text: &str) -> Option<ZoneMatch> {
        self.resolve(&Locality {
            city: Some(text.to_string()),
            port: None,
            country: None,
        })
    }

    fn exact(&self, text: &str) -> Option<ZoneMatch> {
        self.locality_entries()
            .find(|e| {
                normalize_text(&e.code) == text
                    || e.name.as_deref().map(normalize_text).as_deref() == Some(text)
            })
            .map(|e| matched(e, Specificity::Exact))
    }

    fn fuzzy(&self, text: &str) -> Option<ZoneMatch> {
        let mut best: Option<(usize, &ZoneEntry)> = None;

        for entry in self.locality_entries() {
            for alias in entry.name.iter().chain(entry.aliases.iter()) {
                let alias = normalize_text(alias);
                let len = alias.chars().count();
                if len < MIN_FUZZY_LEN {
                    continue;
                }
                let hit = text.contains(&alias)
                    || (text.chars().count() >= MIN_FUZZY_LEN && alias.contains(text));
                if !hit {
                    continue;
                }
                // 严格大于: 平局保留先声明的条目
                if best.map_or(true, |(best_len, _)| len > best_len) {
                    best = Some((len, entry));
                }
            }
        }

        best.map(|(_, e)| matched(e, Specificity::Fuzzy))
    }

    fn country(&self, locality: &Locality) -> Option<ZoneMatch> {
        let country = country_component(locality)?;
        self.table
            .entries
            .iter()
            .filter(|e| e.kind == EntryKind::Country)
            .find(|e| {
                std::iter::once(&e.code)
                    .chain(e.name.iter())
                    .chain(e.aliases.iter())
                    .any(|k| canonical_country(k) == country)
            })
            .map(|e| matched(e, Specificity::Country))
    }

    fn locality_entries(&self) -> impl Iterator<Item = &'a ZoneEntry> {
        let table: &'a ZoneTable = self.table;
        table.entries.iter().filter(|e| e.kind != EntryKind::Country)
    }
}

/// 取地点的国家部分: 显式国家 > 城市文本最后一段 > 港口 UN/LOCODE 前两位
fn country_component(locality: &Locality) -> Option<String> {
    if let Some(country) = locality.country.as_deref().filter(|c| !c.trim().is_empty()) {
        return Some(canonical_country(country));
    }

    if let Some(city) = locality.city.as_deref() {
        let separators = &[',', ';'][..];
        if let Some(last) = city.rsplit(separators).next().filter(|_| city.contains(separators)) {
            let last = last.trim();
            if !last.is_empty() {
                return Some(canonical_country(last));
            }
        }
    }

    locality
        .port
        .as_deref()
        .map(str::trim)
        .filter(|p| p.len() == 5 && p.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|p| canonical_country(&p[..2]))
}

fn matched(entry: &ZoneEntry, specificity: Specificity) -> ZoneMatch {
    ZoneMatch {
        zone: entry.zone.clone(),
        specificity,
        matched: entry.code.clone(),
    }
}
