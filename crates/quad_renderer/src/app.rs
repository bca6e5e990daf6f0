//! Window and frame loop shared by the quad binaries

use std::process::ExitCode;

use crate::config::{AppConfig, Variant};
use crate::foundation::logging;
use crate::render::vulkan::{FrameStatus, Renderer, VulkanResult, Window};

/// Optional configuration file read from the working directory
pub const CONFIG_FILE: &str = "quads.toml";

/// Entry point of the quad binaries: logging, configuration, then [`run`]
pub fn launch(variant: Variant) -> ExitCode {
    logging::init();

    let config = match AppConfig::load_for_variant(CONFIG_FILE, variant) {
        Ok(config) => config,
        Err(err) => {
            log::error!("Failed to load {CONFIG_FILE}: {err}");
            return ExitCode::FAILURE;
        }
    };

    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{}: {err}", variant.title());
            ExitCode::FAILURE
        }
    }
}

/// Open the window, build the renderer and draw until the window is closed
///
/// Frames are paced by sleeping `config.frame_delay_ms` after each one.
pub fn run(config: &AppConfig) -> VulkanResult<()> {
    log::info!("Starting {} ({})", config.window.title, config.app_name);

    let mut window = Window::new(&config.window)?;
    let mut renderer = Renderer::new(&mut window, config)?;
    let frame_delay = config.frame_delay();

    let mut frames: u64 = 0;
    loop {
        let events = window.poll_events();
        if events.close_requested {
            break;
        }
        if events.resized {
            renderer.mark_swapchain_stale();
        }

        if renderer.draw_frame(&mut window)? == FrameStatus::CloseRequested {
            break;
        }
        frames += 1;

        std::thread::sleep(frame_delay);
    }

    log::info!("Closing after {} frames", frames);
    renderer.wait_idle()?;
    Ok(())
}
