//! Lantern viewer: a mesh scene with one focus model over a triangle grid.
//!
//! Controls: WASD translate, Q/E raise and lower, Space cycles the focus
//! object's material, Escape quits.

use lantern_engine::EngineConfig;

fn main() -> anyhow::Result<()> {
    let mut config = EngineConfig::new("Lantern Viewer");

    // Minimal flag parsing, no CLI framework needed for two options.
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--assets" => {
                if i + 1 < args.len() {
                    config = config.with_asset_dir(args[i + 1].clone());
                    i += 1;
                }
            }
            "--no-vsync" => {
                config = config.with_vsync(false);
            }
            other => {
                eprintln!("unknown argument: {other}");
            }
        }
        i += 1;
    }

    lantern_engine::run(config)
}
