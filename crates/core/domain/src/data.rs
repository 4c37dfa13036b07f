/// 外部采集命令的退出状态。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireStatus {
    Success,
    /// 命令以非零状态退出（信号终止时无状态码）。
    Failed(Option<i32>),
}

impl AcquireStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, AcquireStatus::Success)
    }
}

/// 一次采集得到的原始电报：不透明字节载荷 + 退出状态。
///
/// 即使命令失败也可能带有部分载荷，导出侧按格式错误兜底处理。
#[derive(Debug, Clone)]
pub struct RawTelegram {
    pub payload: Vec<u8>,
    pub status: AcquireStatus,
}

/// 电报中已解析的单条测量记录。
///
/// 文本字段保持解析原文，换算与分类在 normalize 能力中完成。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeterRecord {
    pub id: u32,
    pub function: String,
    pub storage_number: String,
    pub unit: String,
    pub value: String,
    pub timestamp: String,
}

/// 指标类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
}

/// 换算与分类后的指标样本。
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledSample {
    /// 指标族名称（如 `kamstrup_volume_m3`）。
    pub name: String,
    /// 指标帮助文本（如 `Volume in m^3`）。
    pub help: String,
    pub kind: MetricKind,
    pub value: f64,
    /// 数量名 token（原始单位文本左半部分，小写下划线形式）。
    pub quantity: String,
    /// 单位 token（括号内符号单位，小写、`^` 去除、`/` 换 `_`）。
    pub unit: String,
    /// 温度特例的 `type` 标签，其余样本为 None。
    pub type_label: Option<String>,
}

impl ScaledSample {
    /// 功率与体积流量样本作为"表计活动"信号回馈给采集调度。
    pub fn is_activity(&self) -> bool {
        self.quantity.starts_with("power") || self.quantity.starts_with("volume_flow")
    }
}
