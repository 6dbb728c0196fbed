//! 机械臂型号描述
//!
//! SO-100 与 SO-101 共用同一套六关节布局，区别只在机械结构。
//! 连续旋转关节的覆盖规则按型号前缀匹配（`so100_follower` 命中 `so100`）。

use soarm_driver::MotorConfig;
use soarm_protocol::NormMode;

/// 单个关节
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JointSpec {
    pub id: u8,
    pub name: &'static str,
    pub norm_mode: NormMode,
}

const SO_ARM_JOINTS: [JointSpec; 6] = [
    JointSpec {
        id: 1,
        name: "shoulder_pan",
        norm_mode: NormMode::RangeM100To100,
    },
    JointSpec {
        id: 2,
        name: "shoulder_lift",
        norm_mode: NormMode::RangeM100To100,
    },
    JointSpec {
        id: 3,
        name: "elbow_flex",
        norm_mode: NormMode::RangeM100To100,
    },
    JointSpec {
        id: 4,
        name: "wrist_flex",
        norm_mode: NormMode::RangeM100To100,
    },
    JointSpec {
        id: 5,
        name: "wrist_roll",
        norm_mode: NormMode::RangeM100To100,
    },
    JointSpec {
        id: 6,
        name: "gripper",
        norm_mode: NormMode::Range0To100,
    },
];

/// 连续旋转关节（型号前缀 → 关节名）
///
/// 这些关节的行程在校准后强制覆盖为 `[0, resolution - 1]`。
const CONTINUOUS_ROTATION: &[(&str, &[&str])] =
    &[("so100", &["wrist_roll"]), ("so101", &["wrist_roll"])];

/// 机械臂型号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotProfile {
    /// 型号字符串（如 `so100_follower`）
    pub robot_type: String,
    pub joints: Vec<JointSpec>,
}

impl RobotProfile {
    /// 按型号字符串查找，未知型号返回 `None`
    pub fn from_type(robot_type: &str) -> Option<Self> {
        let known = ["so100", "so101"];
        if !known.iter().any(|prefix| robot_type.starts_with(prefix)) {
            return None;
        }
        Some(Self {
            robot_type: robot_type.to_string(),
            joints: SO_ARM_JOINTS.to_vec(),
        })
    }

    pub fn so100() -> Self {
        Self {
            robot_type: "so100_follower".to_string(),
            joints: SO_ARM_JOINTS.to_vec(),
        }
    }

    pub fn so101() -> Self {
        Self {
            robot_type: "so101_follower".to_string(),
            joints: SO_ARM_JOINTS.to_vec(),
        }
    }

    pub fn ids(&self) -> Vec<u8> {
        self.joints.iter().map(|j| j.id).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.joints.iter().map(|j| j.name).collect()
    }

    pub fn norm_modes(&self) -> Vec<NormMode> {
        self.joints.iter().map(|j| j.norm_mode).collect()
    }

    pub fn joint(&self, name: &str) -> Option<&JointSpec> {
        self.joints.iter().find(|j| j.name == name)
    }

    /// 全行程的初始电机配置
    pub fn motor_configs(&self, resolution: u16) -> Vec<MotorConfig> {
        self.joints
            .iter()
            .map(|j| MotorConfig::new(j.id, j.name, resolution))
            .collect()
    }

    /// 该型号的连续旋转关节
    pub fn continuous_joints(&self) -> Vec<&'static str> {
        continuous_joints(&self.robot_type)
    }
}

/// 按型号前缀查找连续旋转关节
pub fn continuous_joints(robot_type: &str) -> Vec<&'static str> {
    CONTINUOUS_ROTATION
        .iter()
        .filter(|(prefix, _)| robot_type.starts_with(prefix))
        .flat_map(|(_, joints)| joints.iter().copied())
        .collect()
}
