use crate::NormalizeError;
use domain::{INSTANTANEOUS_FUNCTION, MeterRecord, MetricKind, ScaledSample};

/// 温度类样本统一收敛到固定指标族，用 type 标签区分回路。
const TEMPERATURE_SERIES: &str = "kamstrup_temperature_celcius";
const TEMPERATURE_HELP: &str = "Temperature in Celsius";

/// 将一条测量记录分类为指标样本。
///
/// 返回 `Ok(None)` 表示记录不可导出（Function 非瞬时值）。
/// 数量名 token 取自原始单位文本，单位 token 与 Gauge 关键字匹配
/// 取自 `m m^3/h` -> `l/h` 替换后的文本；两趟归一不对称是上游
/// 约定，序列名依赖它，不得合并。
pub fn classify(
    record: &MeterRecord,
    gauges: &[String],
) -> Result<Option<ScaledSample>, NormalizeError> {
    if record.function != INSTANTANEOUS_FUNCTION {
        return Ok(None);
    }

    // 修复上游已知的畸形单位编码
    let unit = record.unit.replace("m m^3/h", "l/h");
    let value = scale_value(&unit, &record.value)?;

    // 单位 token：最后一个 '(' 之后、最后一个空格之后、首个 ')' 之前
    // 例：Volume (1e-2  m^3) -> m^3
    let unit_segment = unit.rsplit('(').next().unwrap_or(unit.as_str());
    let unit_help = unit_segment.rsplit(' ').next().unwrap_or(unit_segment);
    let unit_help = unit_help.split(')').next().unwrap_or(unit_help);
    let unit_token = unit_help.to_lowercase().replace('^', "").replace('/', "_");

    // 数量名 token 来自未替换的原始文本
    let quantity_help = record.unit.split(" (").next().unwrap_or(&record.unit);
    let quantity = quantity_help.to_lowercase().replace(' ', "_");

    let sample = if quantity.contains("temperature") {
        let type_label = quantity.replace("temperature", "");
        let type_label = type_label.trim_matches('_').to_string();
        ScaledSample {
            name: TEMPERATURE_SERIES.to_string(),
            help: TEMPERATURE_HELP.to_string(),
            kind: MetricKind::Gauge,
            value,
            quantity,
            unit: unit_token,
            type_label: Some(type_label),
        }
    } else {
        let lowered = unit.to_lowercase();
        let kind = if gauges
            .iter()
            .any(|keyword| lowered.contains(&keyword.to_lowercase()))
        {
            MetricKind::Gauge
        } else {
            MetricKind::Counter
        };
        ScaledSample {
            name: format!("kamstrup_{quantity}_{unit_token}"),
            help: format!("{quantity_help} in {unit_help}"),
            kind,
            value,
            quantity,
            unit: unit_token,
            type_label: None,
        }
    };
    Ok(Some(sample))
}

/// 按单位文本中的倍率标记换算原始数值。
///
/// 倍率标记按固定优先级匹配，前三档按浮点除法，后两档按整数乘法，
/// 无标记时原值按整数解析。
fn scale_value(unit: &str, raw: &str) -> Result<f64, NormalizeError> {
    if unit.contains("(m ") {
        Ok(parse_float(raw)? / 1000.0)
    } else if unit.contains("(1e-2 ") {
        Ok(parse_float(raw)? / 100.0)
    } else if unit.contains("(1e-1 ") {
        Ok(parse_float(raw)? / 10.0)
    } else if unit.contains("(10 ") {
        Ok(parse_scaled_int(raw, 10)? as f64)
    } else if unit.contains("(100 ") {
        Ok(parse_scaled_int(raw, 100)? as f64)
    } else {
        Ok(parse_int(raw)? as f64)
    }
}

fn parse_float(raw: &str) -> Result<f64, NormalizeError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|err| NormalizeError::Value(format!("{raw:?}: {err}")))
}

fn parse_int(raw: &str) -> Result<i64, NormalizeError> {
    raw.trim()
        .parse::<i64>()
        .map_err(|err| NormalizeError::Value(format!("{raw:?}: {err}")))
}

fn parse_scaled_int(raw: &str, factor: i64) -> Result<i64, NormalizeError> {
    parse_int(raw)?.checked_mul(factor).ok_or_else(|| {
        NormalizeError::Value(format!("{raw:?}: multiplier {factor} overflows i64"))
    })
}
