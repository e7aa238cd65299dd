use std::process::Stdio;

use xgrip::error::Result;

pub(crate) fn spawn(bin: &str, args: &[String]) -> Result<()> {
    std::process::Command::new(bin)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .args(args)
        .spawn()?;
    tracing::debug!("Spawned {bin} with args {args:?}");
    Ok(())
}
