use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::fmt;

/// 运输方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransportMode {
    Air,
    OceanFcl,
    OceanLcl,
    Express,
    Domestic,
}

/// 服务方向 (决定使用哪一套费率卡)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceDirection {
    Export,
    Import,
    ThirdParty,
    Domestic,
}

/// 集装箱类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerType {
    #[serde(rename = "20FT")]
    Ft20,
    #[serde(rename = "40FT")]
    Ft40,
    #[serde(rename = "40HC")]
    Hc40,
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ContainerType::Ft20 => "20FT",
            ContainerType::Ft40 => "40FT",
            ContainerType::Hc40 => "40HC",
        };
        f.write_str(label)
    }
}

/// 地点 (城市/港口/国家，均可为空)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locality {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub port: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Locality {
    pub fn city(city: &str, country: &str) -> Self {
        Self {
            city: Some(city.to_string()),
            port: None,
            country: Some(country.to_string()),
        }
    }

    pub fn port(port: &str) -> Self {
        Self {
            city: None,
            port: Some(port.to_string()),
            country: None,
        }
    }
}

impl fmt::Display for Locality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<&str> = [&self.port, &self.city, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.trim().is_empty())
            .collect();
        if parts.is_empty() {
            f.write_str("<empty>")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// 集装箱数量
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerCount {
    pub container: ContainerType,
    pub count: u32,
}

/// 发票费用行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeLine {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub amount: BigDecimal,
    pub currency: String,
}

impl ChargeLine {
    pub fn new(code: &str, amount: BigDecimal, currency: &str) -> Self {
        Self {
            code: code.to_string(),
            description: String::new(),
            amount,
            currency: currency.to_string(),
        }
    }

    /// 分组键: 代码优先，代码为空时用描述
    pub fn key(&self) -> String {
        if self.code.trim().is_empty() {
            normalize_text(&self.description)
        } else {
            normalize_text(&self.code)
        }
    }
}

/// 标准化运单 - 由外部解析器生成，引擎只读
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: String,
    pub origin: Locality,
    pub destination: Locality,
    pub mode: TransportMode,
    pub direction: ServiceDirection,
    #[serde(default)]
    pub weight_kg: Option<BigDecimal>,
    #[serde(default)]
    pub volume_cbm: Option<BigDecimal>,
    #[serde(default)]
    pub containers: Vec<ContainerCount>,
    #[serde(default)]
    pub product: Option<String>,
    #[serde(default)]
    pub charges: Vec<ChargeLine>,
}

impl Shipment {
    /// 有效重量 (非正数视为缺失)
    pub fn weight(&self) -> Option<&BigDecimal> {
        self.weight_kg.as_ref().filter(|w| **w > BigDecimal::zero())
    }

    pub fn volume(&self) -> Option<&BigDecimal> {
        self.volume_cbm.as_ref().filter(|v| **v > BigDecimal::zero())
    }

    pub fn declared_containers(&self) -> impl Iterator<Item = &ContainerCount> {
        self.containers.iter().filter(|c| c.count > 0)
    }

    /// 是否国内件: 方向为 DOMESTIC 或起止国家相同
    pub fn is_domestic(&self) -> bool {
        if self.direction == ServiceDirection::Domestic || self.mode == TransportMode::Domestic {
            return true;
        }
        match (&self.origin.country, &self.destination.country) {
            (Some(o), Some(d)) => {
                let o = crate::service::geo::canonical_country(o);
                !o.is_empty() && o == crate::service::geo::canonical_country(d)
            }
            _ => false,
        }
    }
}

/// 大写 + 合并空白
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}
