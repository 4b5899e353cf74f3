//! 题量分配 - 业务能力层
//!
//! 把一条规则的目标题数按章节权重拆分，再下沉到叶子章节。
//! 无论中间比例如何取整，结果之和恒等于目标题数。

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::models::chapter::ChapterNode;
use crate::models::request::ChapterWeight;

// 0.1 + 0.2 + 0.7 这类浮点误差不算超出
const WEIGHT_SUM_TOLERANCE: f64 = 1e-9;

/// 叶子章节的分配结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LeafQuota {
    pub chapter_id: i64,
    pub count: u32,
}

/// 补全缺省比例
///
/// 缺省比例按 1/n 处理，其余比例原样参与取整；比例之和为 0 时退化为均分。
/// 比例之和超过 1 时按和缩放，否则取整结果会超出目标题数
pub fn resolve_weights(weights: &[ChapterWeight]) -> Vec<(i64, f64)> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }
    let uniform = 1.0 / n as f64;

    let raw: Vec<(i64, f64)> = weights
        .iter()
        .map(|w| (w.chapter_id, w.ratio.unwrap_or(uniform).max(0.0)))
        .collect();
    let sum: f64 = raw.iter().map(|(_, r)| r).sum();

    if sum <= f64::EPSILON || !sum.is_finite() {
        return raw.into_iter().map(|(id, _)| (id, uniform)).collect();
    }
    if sum > 1.0 + WEIGHT_SUM_TOLERANCE {
        return raw.into_iter().map(|(id, r)| (id, r / sum)).collect();
    }
    raw
}

/// 按权重拆分：权重降序（同权重按 id 升序）取整，余数依次补 1
///
/// 返回值按上述顺序排列，包含分到 0 的章节
pub fn split_by_weight(total: u32, weighted: &[(i64, f64)]) -> Vec<(i64, u32)> {
    if weighted.is_empty() {
        return Vec::new();
    }

    let mut sorted = weighted.to_vec();
    sorted.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });

    let mut counts: Vec<(i64, u32)> = sorted
        .iter()
        .map(|&(id, w)| (id, (total as f64 * w).floor() as u32))
        .collect();

    let assigned: u32 = counts.iter().map(|(_, c)| c).sum();
    let mut remainder = total.saturating_sub(assigned);
    let n = counts.len();
    let mut i = 0;
    while remainder > 0 {
        counts[i % n].1 += 1;
        remainder -= 1;
        i += 1;
    }

    counts
}

/// 均分：每个取整，余数按顺序补给前几个
fn split_evenly(total: u32, ids: &[i64]) -> Vec<(i64, u32)> {
    let n = ids.len() as u32;
    let base = total / n;
    let extra = (total % n) as usize;
    ids.iter()
        .enumerate()
        .map(|(i, &id)| (id, base + u32::from(i < extra)))
        .collect()
}

/// 章节在同一教材内的全部叶子后代（深度优先，子章节按 id 升序）
///
/// 章节本身没有子章节时返回空
pub fn leaf_descendants(chapter_id: i64, nodes: &[ChapterNode]) -> Vec<i64> {
    let Some(textbook_id) = nodes
        .iter()
        .find(|n| n.chapter_id == chapter_id)
        .map(|n| n.textbook_id)
    else {
        return Vec::new();
    };

    let mut children: HashMap<i64, Vec<i64>> = HashMap::new();
    for node in nodes.iter().filter(|n| n.textbook_id == textbook_id) {
        if let Some(parent) = node.parent_chapter_id {
            children.entry(parent).or_default().push(node.chapter_id);
        }
    }
    for list in children.values_mut() {
        list.sort_unstable();
    }

    let mut leaves = Vec::new();
    let mut visited = HashSet::from([chapter_id]);
    let mut stack: Vec<i64> = children
        .get(&chapter_id)
        .map(|c| c.iter().rev().copied().collect())
        .unwrap_or_default();

    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        match children.get(&id) {
            Some(kids) if !kids.is_empty() => stack.extend(kids.iter().rev().copied()),
            _ => leaves.push(id),
        }
    }

    leaves
}

/// 把一条规则的目标题数分配到叶子章节
///
/// 同一叶子被多个加权章节覆盖时累加；分到 0 的叶子不出现在结果中
pub fn apportion(total: u32, weights: &[ChapterWeight], nodes: &[ChapterNode]) -> Vec<LeafQuota> {
    let resolved = resolve_weights(weights);

    let mut quotas: Vec<LeafQuota> = Vec::new();
    let mut index: HashMap<i64, usize> = HashMap::new();
    let mut add = |chapter_id: i64, count: u32| {
        if count == 0 {
            return;
        }
        match index.get(&chapter_id) {
            Some(&i) => quotas[i].count += count,
            None => {
                index.insert(chapter_id, quotas.len());
                quotas.push(LeafQuota { chapter_id, count });
            }
        }
    };

    for (chapter_id, count) in split_by_weight(total, &resolved) {
        if count == 0 {
            continue;
        }
        let leaves = leaf_descendants(chapter_id, nodes);
        if leaves.is_empty() {
            add(chapter_id, count);
        } else {
            for (leaf_id, leaf_count) in split_evenly(count, &leaves) {
                add(leaf_id, leaf_count);
            }
        }
    }

    quotas
}
