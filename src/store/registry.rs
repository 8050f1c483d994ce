use crate::error::{AuditError, ConfigError, Result};
use crate::models::ServiceChargeSchedule;
use crate::store::snapshot::{RateCardDataset, RateCardSnapshot};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

/// 费率卡仓库 - 按版本保存不可变快照
///
/// 发布新版本不会修改已有快照；正在审计的调用方持有自己的 Arc，
/// 即使旧版本被淘汰也不受影响。
pub struct RateCardStore {
    snapshots: DashMap<u64, Arc<RateCardSnapshot>>,
    current: RwLock<Option<Arc<RateCardSnapshot>>>,
    next_version: AtomicU64,
    retain: usize,
    publish_lock: Mutex<()>,
}

impl RateCardStore {
    pub fn new(retain: usize) -> Self {
        Self {
            snapshots: DashMap::new(),
            current: RwLock::new(None),
            next_version: AtomicU64::new(1),
            retain: retain.max(1),
            publish_lock: Mutex::new(()),
        }
    }

    /// 校验并发布新版本; 人工维护的卡与服务费条目从当前版本继承
    pub fn publish(&self, dataset: RateCardDataset) -> std::result::Result<Arc<RateCardSnapshot>, ConfigError> {
        let _guard = self.publish_lock.lock().unwrap_or_else(|e| e.into_inner());

        let dataset = match self.current() {
            Some(current) => carry_over_overrides(dataset, &current),
            None => dataset,
        };

        let version = self.next_version.load(Ordering::SeqCst);
        let snapshot = Arc::new(RateCardSnapshot::build(version, dataset)?);
        self.next_version.store(version + 1, Ordering::SeqCst);

        self.snapshots.insert(version, snapshot.clone());
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = Some(snapshot.clone());
        self.evict(version);

        tracing::info!(
            "[RateCards] 发布费率快照 v{}: {} 张费率卡, {} 张分区表",
            version,
            snapshot.cards.len(),
            snapshot.zone_tables.len()
        );
        Ok(snapshot)
    }

    pub fn current(&self) -> Option<Arc<RateCardSnapshot>> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, version: u64) -> Option<Arc<RateCardSnapshot>> {
        self.snapshots.get(&version).map(|s| s.value().clone())
    }

    /// 指定版本或当前版本
    pub fn snapshot(&self, version: Option<u64>) -> Result<Arc<RateCardSnapshot>> {
        match version {
            Some(v) => self.get(v).ok_or(AuditError::UnknownVersion(v)),
            None => self.current().ok_or(AuditError::NoSnapshot),
        }
    }

    pub fn versions(&self) -> Vec<u64> {
        let mut versions: Vec<u64> = self.snapshots.iter().map(|e| *e.key()).collect();
        versions.sort_unstable();
        versions
    }

    fn evict(&self, latest: u64) {
        let keep_from = (latest + 1).saturating_sub(self.retain as u64);
        self.snapshots.retain(|version, _| {
            let keep = *version >= keep_from;
            if !keep {
                tracing::debug!("[RateCards] 淘汰费率快照 v{}", version);
            }
            keep
        });
    }
}

/// 人工维护的卡整体替换导入数据中的同 id 卡 (导入缺失时追加)，
/// 其引用的分区表在导入缺失时一并带入; 服务费条目同理
fn carry_over_overrides(mut dataset: RateCardDataset, current: &RateCardSnapshot) -> RateCardDataset {
    for card in current.cards.iter().filter(|c| c.manual_override) {
        match dataset.cards.iter_mut().find(|c| c.id == card.id) {
            Some(slot) => *slot = card.clone(),
            None => dataset.cards.push(card.clone()),
        }
        tracing::info!("[RateCards] 保留人工维护费率卡 {}", card.id);

        if let Some(name) = card.zone_table.as_deref() {
            let missing = !dataset.zone_tables.iter().any(|t| t.name == name);
            if let (true, Some(table)) = (missing, current.zone_table(name)) {
                dataset.zone_tables.push(table.clone());
            }
        }
    }

    for (mode, schedule) in &current.schedules {
        for entry in schedule.entries.iter().filter(|e| e.manual_override) {
            let target = match dataset.schedules.iter().position(|s| s.mode == *mode) {
                Some(idx) => &mut dataset.schedules[idx],
                None => {
                    dataset.schedules.push(ServiceChargeSchedule::new(*mode));
                    let last = dataset.schedules.len() - 1;
                    &mut dataset.schedules[last]
                }
            };
            let key = entry.key();
            match target.entries.iter_mut().find(|e| e.key() == key) {
                Some(slot) => *slot = entry.clone(),
                None => target.entries.push(entry.clone()),
            }
        }
    }

    dataset
}
