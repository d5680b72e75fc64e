//! 敏感字段处理
//!
//! 客户端拿到的配置中敏感字段会被替换为 [`FAKE_SETTING`]。客户端原样提交回来时，
//! [`desanitize`] 把占位符还原为上一代配置中的真实值，避免误把密钥抹掉。

use serde_json::Value;

use super::ConfigModel;
use crate::errors::StoreResult;

/// 敏感字段的占位符
pub const FAKE_SETTING: &str = "********************************";

/// 将 `target` 中所有仍为占位符的敏感字段还原为 `actual` 中对应的值
pub fn desanitize<C: ConfigModel>(actual: &C, target: &mut C) -> StoreResult<()> {
    let actual_value = serde_json::to_value(actual)?;
    let mut target_value = serde_json::to_value(&*target)?;

    let mut restored = false;
    for path in C::sensitive_fields() {
        let segments: Vec<&str> = path.split('.').collect();
        restored |= restore(Some(&actual_value), &mut target_value, &segments);
    }

    if restored {
        *target = serde_json::from_value(target_value)?;
    }
    Ok(())
}

/// 生成一份敏感字段被替换为占位符的副本
pub fn sanitize<C: ConfigModel>(config: &C) -> StoreResult<C> {
    let mut value = serde_json::to_value(config)?;
    for path in C::sensitive_fields() {
        let segments: Vec<&str> = path.split('.').collect();
        mask(&mut value, &segments);
    }
    Ok(serde_json::from_value(value)?)
}

/// 按 `.` 分隔的路径取值
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, segment| current.get(segment))
}

/// 字段不存在、为 null 或为空字符串都视为缺失
pub fn is_missing(value: &Value, path: &str) -> bool {
    match lookup(value, path) {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn restore(actual: Option<&Value>, target: &mut Value, segments: &[&str]) -> bool {
    match segments.split_first() {
        Some((head, rest)) => match target.get_mut(*head) {
            Some(child) => restore(actual.and_then(|a| a.get(*head)), child, rest),
            None => false,
        },
        None => restore_leaf(actual, target),
    }
}

fn restore_leaf(actual: Option<&Value>, target: &mut Value) -> bool {
    if target.as_str() == Some(FAKE_SETTING) {
        return match actual {
            Some(real) => {
                *target = real.clone();
                true
            }
            None => false,
        };
    }

    // 列表型敏感字段逐项还原
    if let Value::Array(items) = target {
        let mut restored = false;
        for (index, item) in items.iter_mut().enumerate() {
            restored |= restore_leaf(actual.and_then(|a| a.get(index)), item);
        }
        return restored;
    }

    false
}

fn mask(target: &mut Value, segments: &[&str]) {
    match segments.split_first() {
        Some((head, rest)) => {
            if let Some(child) = target.get_mut(*head) {
                mask(child, rest);
            }
        }
        None => mask_leaf(target),
    }
}

fn mask_leaf(target: &mut Value) {
    match target {
        Value::String(s) if !s.is_empty() => *s = FAKE_SETTING.to_string(),
        Value::Array(items) => items.iter_mut().for_each(mask_leaf),
        _ => {}
    }
}
