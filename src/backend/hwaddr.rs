use std::io;
use std::path::{Path, PathBuf};

const SYS_NET_ROOT: &str = "/sys/class/net";

/// 读取网卡硬件地址
pub fn hardware_address(interface: &str) -> io::Result<String> {
    hardware_address_in(Path::new(SYS_NET_ROOT), interface)
}

fn hardware_address_in(root: &Path, interface: &str) -> io::Result<String> {
    if interface.is_empty() || interface.contains('/') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("invalid interface name '{}'", interface),
        ));
    }

    let path: PathBuf = root.join(interface).join("address");
    let raw = std::fs::read_to_string(&path).map_err(|e| {
        io::Error::new(
            e.kind(),
            format!("failed to read {}: {}", path.display(), e),
        )
    })?;
    Ok(raw.trim().to_string())
}
