use anyhow::{Result, bail};

use crate::descriptor::DescriptorSet;

/// 参考设计的描述符库，设计 ID 即下标
///
/// 构建完成后不再修改，所有请求共享同一份只读数据。
#[derive(Debug, Default)]
pub struct Corpus {
    designs: Vec<DescriptorSet>,
    dim: Option<usize>,
}

impl Corpus {
    /// 使用按 ID 排列的描述符集合构建描述符库
    ///
    /// 所有非空集合的描述符维度必须一致。
    pub fn new(designs: Vec<DescriptorSet>) -> Result<Self> {
        let mut dim = None;
        for (id, set) in designs.iter().enumerate() {
            if set.is_empty() {
                continue;
            }
            match dim {
                None => dim = Some(set.dim()),
                Some(d) if d != set.dim() => {
                    bail!("设计 {} 的描述符维度为 {}，与其他设计的 {} 不一致", id, set.dim(), d);
                }
                _ => {}
            }
        }
        Ok(Self { designs, dim })
    }

    pub fn get(&self, id: usize) -> Option<&DescriptorSet> {
        self.designs.get(id)
    }

    /// 设计数量
    pub fn len(&self) -> usize {
        self.designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.designs.is_empty()
    }

    /// 描述符维度，描述符库中没有任何描述符时为 `None`
    pub fn dim(&self) -> Option<usize> {
        self.dim
    }

    /// 描述符总数
    pub fn total_descriptors(&self) -> usize {
        self.designs.iter().map(DescriptorSet::len).sum()
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = (usize, &DescriptorSet)> {
        self.designs.iter().enumerate()
    }
}
