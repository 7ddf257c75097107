use vigil_core::{Aggregate, Operator};

/// 单个条件在一个窗口上的判定结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub triggered: bool,
    /// 随判定一起上报的代表值
    pub value: f64,
}

/// 按聚合方式对窗口内的采样求值，没有采样时返回 None
///
/// - `avg`：对均值应用一次比较，上报均值
/// - `all`：全部满足才触发；未触发时上报不满足采样的极值，触发时上报全部采样的极值
/// - `any`：任一满足即触发，上报全部采样的极值
///
/// 极值方向由比较方式决定：gt 取最大，lt 取最小。
pub fn compute(
    operator: Operator,
    aggregate: Aggregate,
    threshold: f64,
    values: &[f64],
) -> Option<Evaluation> {
    if values.is_empty() {
        return None;
    }

    let evaluation = match aggregate {
        Aggregate::Avg => {
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            Evaluation {
                triggered: operator.apply(mean, threshold),
                value: mean,
            }
        }
        Aggregate::All => {
            let failing: Vec<f64> = values
                .iter()
                .copied()
                .filter(|v| !operator.apply(*v, threshold))
                .collect();
            if failing.is_empty() {
                Evaluation {
                    triggered: true,
                    value: operator.extreme(values.iter().copied())?,
                }
            } else {
                Evaluation {
                    triggered: false,
                    value: operator.extreme(failing)?,
                }
            }
        }
        Aggregate::Any => Evaluation {
            triggered: values.iter().any(|v| operator.apply(*v, threshold)),
            value: operator.extreme(values.iter().copied())?,
        },
    };

    Some(evaluation)
}
