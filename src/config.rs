use clap::Parser;

use crate::models::VideoChipType;

/// Environment variable telling the emulator where to connect its serial
/// (register) stream.
pub const SERIAL_PORT_ENV: &str = "CHIPBRIDGE_SERIAL_PORT";

/// Environment variable telling the emulator's screenshot helper where to
/// send raw frames.
pub const SCREENSHOT_PORT_ENV: &str = "HELPERLUA_SCREENSHOT_PORT";

/// Byte sent by the firmware once it accepts register commands.
pub const READY_MARKER: u8 = b'!';

#[derive(Parser, Debug, Clone)]
#[command(version, about = "Bridges test clients to an emulated video chip.", long_about = None)]
pub struct BridgeConfig {
    /// Address to listen on for test clients
    #[arg(long, value_name = "HOST:PORT")]
    pub listen: String,

    /// Chip variant reported to `TYPE?`
    #[arg(long, value_name = "EF9345|TS9347", default_value = "TS9347")]
    pub chip_type: VideoChipType,

    /// Local port for the emulator's register byte stream (0 picks one)
    #[arg(long, value_name = "PORT", default_value_t = 0)]
    pub serial_port: u16,

    /// Local port for the emulator's raw frame stream (0 picks one)
    #[arg(long, value_name = "PORT", default_value_t = 0)]
    pub screenshot_port: u16,

    /// Do not wait for the firmware readiness byte before serving clients
    #[arg(long)]
    pub no_ready_wait: bool,

    /// Emulator command to launch once both ports are bound
    #[arg(last = true, value_name = "EMULATOR")]
    pub emulator: Vec<String>,
}
