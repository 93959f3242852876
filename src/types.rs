//! 通用 n 关节动作/观测类型
//!
//! 核心对动作与观测是泛型的；这里提供一对开箱即用的参考类型，
//! 覆盖按关节下发力矩/位置指令的常见机器人。宿主也可以定义
//! 自己的类型，只要满足 `Clone + Send`（跨进程时再加 serde）。

use serde::{Deserialize, Serialize};
use serde::ser::SerializeTuple;
use serde::de::{SeqAccess, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;
use std::marker::PhantomData;

/// 为任意长度 `[f64; N]` 手写 serde 支持：serde 的派生宏只对固定的
/// 若干长度（0..=32）内建实现了 `Deserialize`，对泛型 `N` 并不适用。
fn serialize_f64_array<S, const N: usize>(arr: &[f64; N], s: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut t = s.serialize_tuple(N)?;
    for v in arr {
        t.serialize_element(v)?;
    }
    t.end()
}

fn deserialize_f64_array<'de, D, const N: usize>(d: D) -> Result<[f64; N], D::Error>
where
    D: Deserializer<'de>,
{
    struct ArrayVisitor<const N: usize>(PhantomData<[f64; N]>);

    impl<'de, const N: usize> Visitor<'de> for ArrayVisitor<N> {
        type Value = [f64; N];

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            write!(f, "an array of {N} f64 values")
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut out = [0.0f64; N];
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(i, &self))?;
            }
            Ok(out)
        }
    }

    d.deserialize_tuple(N, ArrayVisitor(PhantomData))
}

/// n 关节机器人的动作
///
/// 发往机器人的最终力矩是
///
/// ```text
/// sent_torque = torque + PD(position)
/// ```
///
/// 位置设为 NaN 表示关闭该关节的位置控制器；增益设为 NaN 表示
/// 使用驱动默认值。控制器按关节独立执行，可只对部分关节启用。
///
/// # Example
///
/// ```
/// use servolink::types::JointAction;
///
/// // 纯力矩动作
/// let a = JointAction::<3>::torque([0.1, 0.0, -0.1]);
///
/// // 位置动作（默认增益）
/// let a = JointAction::<3>::position([0.0, 0.5, 1.0]);
///
/// // 零力矩动作（位置控制关闭）
/// let a = JointAction::<3>::zero();
/// assert_eq!(a.torque, [0.0; 3]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointAction<const N: usize> {
    /// 期望力矩（叠加在位置控制器输出之上）
    #[serde(serialize_with = "serialize_f64_array", deserialize_with = "deserialize_f64_array")]
    pub torque: [f64; N],
    /// 期望位置；NaN = 该关节关闭位置控制
    #[serde(serialize_with = "serialize_f64_array", deserialize_with = "deserialize_f64_array")]
    pub position: [f64; N],
    /// 位置控制器 P 增益；NaN = 用默认值
    #[serde(serialize_with = "serialize_f64_array", deserialize_with = "deserialize_f64_array")]
    pub position_kp: [f64; N],
    /// 位置控制器 D 增益；NaN = 用默认值
    #[serde(serialize_with = "serialize_f64_array", deserialize_with = "deserialize_f64_array")]
    pub position_kd: [f64; N],
}

impl<const N: usize> JointAction<N> {
    /// 全 NaN 向量（“未设置”哨兵）
    pub fn none() -> [f64; N] {
        [f64::NAN; N]
    }

    /// 纯力矩动作
    pub fn torque(torque: [f64; N]) -> Self {
        Self {
            torque,
            position: Self::none(),
            position_kp: Self::none(),
            position_kd: Self::none(),
        }
    }

    /// 纯位置动作（力矩为零；NaN 关节沿用默认行为）
    pub fn position(position: [f64; N]) -> Self {
        Self {
            torque: [0.0; N],
            position,
            position_kp: Self::none(),
            position_kd: Self::none(),
        }
    }

    /// 力矩 + 位置动作，可指定增益
    pub fn torque_and_position(
        torque: [f64; N],
        position: [f64; N],
        position_kp: [f64; N],
        position_kd: [f64; N],
    ) -> Self {
        Self {
            torque,
            position,
            position_kp,
            position_kd,
        }
    }

    /// 零力矩动作（位置控制关闭）
    pub fn zero() -> Self {
        Self::torque([0.0; N])
    }
}

impl<const N: usize> Default for JointAction<N> {
    fn default() -> Self {
        Self::zero()
    }
}

/// n 关节机器人的观测
///
/// `tip_force` 是可选传感器列（并非所有机型都装指尖力传感器），
/// 数据模型原样透传，核心不解释其含义。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JointObservation<const N: usize> {
    /// 关节角（弧度）
    #[serde(serialize_with = "serialize_f64_array", deserialize_with = "deserialize_f64_array")]
    pub position: [f64; N],
    /// 关节角速度（弧度/秒）
    #[serde(serialize_with = "serialize_f64_array", deserialize_with = "deserialize_f64_array")]
    pub velocity: [f64; N],
    /// 实测力矩
    #[serde(serialize_with = "serialize_f64_array", deserialize_with = "deserialize_f64_array")]
    pub torque: [f64; N],
    /// 指尖力传感器读数（无此传感器的机型为 `None`）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_force: Option<Vec<f64>>,
}

impl<const N: usize> Default for JointObservation<N> {
    fn default() -> Self {
        Self {
            position: [0.0; N],
            velocity: [0.0; N],
            torque: [0.0; N],
            tip_force: None,
        }
    }
}
