//! Construction of the forwarding command.

use crate::config::TunnelConfig;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Seconds the SSH client may spend establishing the connection.
pub const CONNECT_TIMEOUT_SECS: u32 = 10;

/// Arguments for `ssh`, forwarding `local_port` to `remote_port` on `host`.
///
/// `-N -L <local>:127.0.0.1:<remote> -o StrictHostKeyChecking=no
/// -o ConnectTimeout=10 [-i <identity>] <host>`
pub fn forwarding_args(config: &TunnelConfig) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-N".into(),
        "-L".into(),
        format!("{}:127.0.0.1:{}", config.local_port, config.remote_port).into(),
        "-o".into(),
        "StrictHostKeyChecking=no".into(),
        "-o".into(),
        format!("ConnectTimeout={CONNECT_TIMEOUT_SECS}").into(),
    ];

    if let Some(identity) = &config.identity_file_path {
        args.push("-i".into());
        args.push(identity.clone().into_os_string());
    }

    args.push(config.host.clone().into());
    args
}

/// A ready-to-spawn forwarding command.
///
/// stdout is discarded and stderr piped so an early exit can be explained.
/// The child is killed if its handle is dropped.
pub fn forwarding_command(program: &Path, config: &TunnelConfig) -> Command {
    let mut command = Command::new(program);
    command
        .args(forwarding_args(config))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    command
}

/// Render the command line for logs.
pub fn describe(program: &Path, config: &TunnelConfig) -> String {
    let mut parts = vec![program.display().to_string()];
    parts.extend(
        forwarding_args(config)
            .iter()
            .map(|arg| arg.to_string_lossy().into_owned()),
    );
    parts.join(" ")
}
