use std::path::PathBuf;

use eframe::egui;
use tracing_subscriber::EnvFilter;

mod app;
mod gemini;
mod overlay;
mod types;

use app::TranslateOverlayApp;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    // Optional initial image; everything also works via Open... or
    // drag-and-drop once the window is up.
    let initial_image = std::env::args().nth(1).map(PathBuf::from);
    if let Some(path) = &initial_image {
        if !path.exists() {
            eprintln!("File not found: {}", path.display());
            std::process::exit(1);
        }
    }

    let title = "translate-overlay";
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 800.0])
            .with_title(title),
        ..Default::default()
    };

    eframe::run_native(
        title,
        options,
        Box::new(move |cc| Ok(Box::new(TranslateOverlayApp::new(cc, initial_image)))),
    )
    .expect("Failed to run eframe");
}
