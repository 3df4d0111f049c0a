use serialport::{SerialPortInfo, SerialPortType};

/// Builds a human-readable description for a listed port: the USB product
/// string if present, falling back to manufacturer, falling back to the
/// port-type tag. Used for both display and `"STM"`-substring matching.
pub fn describe(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => usb
            .product
            .clone()
            .or_else(|| usb.manufacturer.clone())
            .unwrap_or_else(|| format!("USB {:04x}:{:04x}", usb.vid, usb.pid)),
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth".to_string(),
        SerialPortType::Unknown => "unknown".to_string(),
    }
}

/// Case-insensitive substring match over each port's description, first hit
/// wins. This is the `"STM"`-substring auto-selection rule — not a full
/// device-identification scheme, just the one-line contract from the
/// external shell's port scanner.
pub fn find_by_keyword(ports: &[SerialPortInfo], keyword: &str) -> Option<usize> {
    let keyword = keyword.to_ascii_lowercase();
    ports
        .iter()
        .position(|p| describe(p).to_ascii_lowercase().contains(&keyword))
}
