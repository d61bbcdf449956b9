use serde::{Deserialize, Serialize};

/**
 * 单个分段内已匹配记录的索引
 *
 * 三个并行数组：记录行首偏移、作业 ID 字段偏移、是否有归档。
 * 追加总是三者一起进行，长度始终相等。
 */
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemList {
    line_offset: Vec<usize>,
    offset: Vec<usize>,
    archived: Vec<bool>,
}

impl ItemList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, line_offset: usize, job_id_offset: usize, archived: bool) {
        self.line_offset.push(line_offset);
        self.offset.push(job_id_offset);
        self.archived.push(archived);
    }

    /// 批量追加另一个列表（一个批次提交时使用）
    pub fn append(&mut self, other: &mut ItemList) {
        self.line_offset.append(&mut other.line_offset);
        self.offset.append(&mut other.offset);
        self.archived.append(&mut other.archived);
    }

    /// 追加一个以 `base` 为起点读取的列表，偏移换算为文件内的绝对偏移
    pub fn extend_shifted(&mut self, other: &ItemList, base: usize) {
        self.line_offset
            .extend(other.line_offset.iter().map(|o| o + base));
        self.offset.extend(other.offset.iter().map(|o| o + base));
        self.archived.extend_from_slice(&other.archived);
    }

    pub fn len(&self) -> usize {
        self.line_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.line_offset.is_empty()
    }

    pub fn clear(&mut self) {
        self.line_offset.clear();
        self.offset.clear();
        self.archived.clear();
    }

    pub fn line_offset(&self, item: usize) -> Option<usize> {
        self.line_offset.get(item).copied()
    }

    pub fn job_id_offset(&self, item: usize) -> Option<usize> {
        self.offset.get(item).copied()
    }

    pub fn is_archived(&self, item: usize) -> Option<bool> {
        self.archived.get(item).copied()
    }

    pub fn line_offsets(&self) -> &[usize] {
        &self.line_offset
    }
}
