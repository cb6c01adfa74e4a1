use anyhow::{Result, bail};
use ndarray::Array2;

/// 一张图片的特征描述符矩阵，每行一个描述符
///
/// 数据按行连续存放，`dim` 为每个描述符的长度。
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DescriptorSet {
    dim: usize,
    rows: usize,
    data: Vec<f32>,
}

impl DescriptorSet {
    /// 创建一个指定维度的空描述符集合
    pub fn new(dim: usize) -> Self {
        Self { dim, rows: 0, data: vec![] }
    }

    /// 从按行展开的数据构造描述符集合
    pub fn from_vec(dim: usize, data: Vec<f32>) -> Result<Self> {
        if dim == 0 {
            if !data.is_empty() {
                bail!("描述符维度为 0，但数据长度为 {}", data.len());
            }
            return Ok(Self::default());
        }
        if data.len() % dim != 0 {
            bail!("数据长度 {} 不是描述符维度 {} 的整数倍", data.len(), dim);
        }
        Ok(Self { dim, rows: data.len() / dim, data })
    }

    /// 从二维数组构造，数组的每一行为一个描述符
    pub fn from_array(array: &Array2<f32>) -> Self {
        let (rows, dim) = array.dim();
        let data = if rows == 0 { vec![] } else { array.iter().copied().collect() };
        Self { dim, rows, data }
    }

    /// 转换为二维数组
    pub fn to_array(&self) -> Array2<f32> {
        Array2::from_shape_fn((self.rows, self.dim), |(r, c)| self.data[r * self.dim + c])
    }

    pub fn push(&mut self, v: &[f32]) {
        assert_eq!(self.dim, v.len(), "descriptor dimensionality mismatch");
        self.rows += 1;
        self.data.extend_from_slice(v);
    }

    /// 只保留前 `n` 个描述符
    pub fn truncate(&mut self, n: usize) {
        if n < self.rows {
            self.rows = n;
            self.data.truncate(n * self.dim);
        }
    }

    /// 描述符数量
    pub fn len(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// 描述符维度
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// 获取第 `n` 个描述符
    pub fn line(&self, n: usize) -> &[f32] {
        &self.data[n * self.dim..(n + 1) * self.dim]
    }

    /// 逐行遍历描述符
    pub fn iter_lines(&self) -> impl ExactSizeIterator<Item = &[f32]> + '_ {
        (0..self.rows).map(move |n| self.line(n))
    }
}
