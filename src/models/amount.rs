use bigdecimal::{BigDecimal, Zero};

/// 金额统一保留两位小数
pub fn money(value: &BigDecimal) -> BigDecimal {
    value.round(2).with_scale(2)
}

/// 向上取整到 step 的整数倍 (计费重量)
pub fn ceil_to_step(value: &BigDecimal, step: &BigDecimal) -> BigDecimal {
    let units = (value / step).with_scale(0);
    let floored = &units * step;
    if &floored < value {
        (units + BigDecimal::from(1)) * step
    } else {
        floored
    }
}

/// 严格大于 value 的第一个 step 倍数
pub fn next_step_above(value: &BigDecimal, step: &BigDecimal) -> BigDecimal {
    let ceiled = ceil_to_step(value, step);
    if &ceiled <= value {
        ceiled + step
    } else {
        ceiled
    }
}

/// part / whole * 100 (不舍入)，whole 为零时无意义
pub fn ratio_percent(part: &BigDecimal, whole: &BigDecimal) -> Option<BigDecimal> {
    if whole.is_zero() {
        return None;
    }
    Some(part * BigDecimal::from(100) / whole)
}

pub fn total<'a>(values: impl IntoIterator<Item = &'a BigDecimal>) -> BigDecimal {
    values
        .into_iter()
        .fold(BigDecimal::zero(), |acc, v| acc + v)
}
