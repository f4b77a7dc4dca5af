//! 模式切换与单帧控制命令

use super::{Pending, REPLY_TIMEOUT, connect, report_reply};
use ak80_driver::MotorConfig;
use ak80_protocol::MitSetpoint;
use anyhow::Result;
use clap::Args;

/// 模式指令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeAction {
    Enter,
    Exit,
    Zero,
}

impl ModeAction {
    pub fn execute(self, config: &MotorConfig) -> Result<()> {
        let motor = connect(config)?;
        let pending = Pending::mark(&motor);

        match self {
            ModeAction::Enter => motor.enter_control_mode()?,
            ModeAction::Exit => motor.exit_control_mode()?,
            ModeAction::Zero => motor.zero_position()?,
        }

        let reply = pending.wait(&motor, REPLY_TIMEOUT)?;
        println!("✅ {:?} → motor 0x{:02X}", self, motor.controller_id());
        report_reply(reply);
        Ok(())
    }
}

/// MIT 控制参数
#[derive(Args, Debug, Clone, PartialEq)]
pub struct SetpointArgs {
    /// 目标位置（rad）
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub pos: f32,

    /// 目标速度（rad/s）
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub vel: f32,

    /// 位置增益
    #[arg(long, default_value_t = 0.0)]
    pub kp: f32,

    /// 速度增益
    #[arg(long, default_value_t = 0.5)]
    pub kd: f32,

    /// 前馈力矩（N·m）
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub torque: f32,
}

impl SetpointArgs {
    pub fn setpoint(&self) -> MitSetpoint {
        MitSetpoint::new(self.pos, self.vel, self.kp, self.kd, self.torque)
    }
}

/// 发送单帧控制指令
#[derive(Args, Debug)]
pub struct SendCommand {
    #[command(flatten)]
    pub setpoint: SetpointArgs,

    /// 发送前先进入 MIT 模式
    #[arg(long)]
    pub enter: bool,
}

impl SendCommand {
    pub fn execute(&self, config: &MotorConfig) -> Result<()> {
        let motor = connect(config)?;

        if self.enter {
            let pending = Pending::mark(&motor);
            motor.enter_control_mode()?;
            pending.wait(&motor, REPLY_TIMEOUT)?;
        }

        let pending = Pending::mark(&motor);
        let clamped = motor.send_setpoint(&self.setpoint.setpoint())?;
        let reply = pending.wait(&motor, REPLY_TIMEOUT)?;

        println!(
            "✅ sent: pos = {:.4}  vel = {:.3}  kp = {:.2}  kd = {:.3}  torque = {:.3}",
            clamped.position, clamped.velocity, clamped.kp, clamped.kd, clamped.torque
        );
        report_reply(reply);
        Ok(())
    }
}
