//! List audio devices with their channel counts

use multimic_audio::{AudioBackend, AudioHost};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let host = AudioHost::new();
    println!("Audio devices on {}:", host.name());

    for device in host.devices()? {
        let kind = if device.is_input() { "INPUT " } else { "output" };
        println!(
            "{:3}: [{}] {} (IN={}, OUT={})",
            device.index, kind, device.name, device.max_input_channels, device.max_output_channels
        );
    }
    Ok(())
}
