//! Config command implementation

use cc2500_core::DriverConfig;

/// Print the effective configuration after file and flag overrides
pub fn print_config(config: &DriverConfig) {
    println!("Driver configuration:");
    println!();
    println!("  {:<16} {}", "name", config.name);
    println!("  {:<16} {}", "bus", config.bus_num);
    println!("  {:<16} {}", "chip select", config.chip_select);
    println!("  {:<16} {}", "max speed", format_speed(config.max_speed_hz));
    println!(
        "  {:<16} {} ({:?})",
        "mode",
        config.mode.clock_mode(),
        config.mode
    );
    println!("  {:<16} {}", "bits per word", config.bits_per_word);
    println!("  {:<16} {} bytes", "status buffer", config.buffer_size);
}

fn format_speed(hz: u32) -> String {
    if hz >= 1_000_000 && hz % 1_000_000 == 0 {
        format!("{} MHz", hz / 1_000_000)
    } else if hz >= 1_000 && hz % 1_000 == 0 {
        format!("{} kHz", hz / 1_000)
    } else {
        format!("{} Hz", hz)
    }
}
