use std::{
    fs, io,
    path::PathBuf,
    process::Command,
    sync::Once,
    thread,
    time::{Duration, Instant},
};

static LOGGER: Once = Once::new();

pub fn init_logging() {
    LOGGER.call_once(|| {
        env_logger::builder().is_test(true).init();
    });
}

pub fn temp_dir() -> io::Result<PathBuf> {
    let dir = std::env::temp_dir().join(format!("cache-sweep-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Writes a `/bin/sh` script standing in for the simulator.
pub fn script(name: &str, body: &str) -> io::Result<PathBuf> {
    let path = temp_dir()?.join(format!("{name}.sh"));
    fs::write(&path, format!("#!/bin/sh\n{body}\n"))?;
    Ok(path)
}

/// Writes a binary trace of `records` little-endian 32-bit addresses.
pub fn trace_file(name: &str, records: u32) -> io::Result<PathBuf> {
    let path = temp_dir()?.join(name);
    let bytes: Vec<u8> = (0..records)
        .flat_map(|addr| (addr * 4).to_le_bytes())
        .collect();
    fs::write(&path, bytes)?;
    Ok(path)
}

/// Reads a pid a script wrote with `echo $$ > file`.
pub fn read_pid(path: &PathBuf) -> anyhow::Result<u32> {
    Ok(fs::read_to_string(path)?.trim().parse()?)
}

/// Zombies count as gone: they are dead, only waiting for their parent.
pub fn is_alive(pid: u32) -> bool {
    if let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) {
        return stat
            .rsplit_once(") ")
            .is_some_and(|(_, rest)| !rest.starts_with('Z'));
    }
    Command::new("/bin/sh")
        .arg("-c")
        .arg(format!("kill -0 {pid} 2>/dev/null"))
        .status()
        .is_ok_and(|status| status.success())
}

/// Orphans are reaped by init, so give them a moment to disappear.
pub fn wait_until_gone(pid: u32, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if !is_alive(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    !is_alive(pid)
}
