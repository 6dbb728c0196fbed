//! 命令定义和实现

pub mod calibrate;
pub mod config;
pub mod r#move;
pub mod ports;
pub mod position;
pub mod teleop;

pub use calibrate::CalibrateCommand;
pub use config::ConfigCommand;
pub use r#move::MoveCommand;
pub use ports::PortsCommand;
pub use position::PositionCommand;
pub use teleop::TeleopCommand;
