use crate::error::Result;
use crate::models::Shipment;
use crate::store::snapshot::RateCardDataset;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// 读取 JSON 费率数据集 (仅解析，校验在发布时进行)
pub fn load_dataset(path: impl AsRef<Path>) -> Result<RateCardDataset> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let dataset: RateCardDataset = serde_json::from_reader(reader)?;
    tracing::info!(
        "[Loader] 读取费率数据集 {}: {} 张费率卡, {} 张分区表, {} 份服务费表",
        path.display(),
        dataset.cards.len(),
        dataset.zone_tables.len(),
        dataset.schedules.len()
    );
    Ok(dataset)
}

/// 读取 JSON 运单数组
pub fn load_shipments(path: impl AsRef<Path>) -> Result<Vec<Shipment>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    Ok(serde_json::from_reader(reader)?)
}
