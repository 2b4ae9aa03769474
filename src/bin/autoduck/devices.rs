use autoduck::audio;

/// `AUTODUCK_TEST_DEVICES` overrides discovery with a comma-separated list.
fn test_devices(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub(crate) fn print_input_devices() {
    let devices = if let Ok(raw) = std::env::var("AUTODUCK_TEST_DEVICES") {
        test_devices(&raw)
    } else {
        audio::list_input_devices().unwrap_or_else(|err| {
            eprintln!("Failed to list audio input devices: {err:#}");
            Vec::new()
        })
    };

    if devices.is_empty() {
        println!("No audio input devices detected.");
    } else {
        println!("Detected audio input devices:");
        for name in devices {
            println!("  - {name}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_devices_trims_and_skips_blanks() {
        assert_eq!(
            test_devices(" USB Mic , ,Built-in "),
            vec!["USB Mic".to_string(), "Built-in".to_string()]
        );
        assert!(test_devices("   ").is_empty());
    }
}
