use calloop::LoopSignal;
use log::info;

use crate::{display::Display, Error, Result};

/// Install a ctrl-c handler that stops the event loop instead of exiting immediately.
pub(super) fn install_shutdown_handler(signal: LoopSignal) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("shutdown requested");
        signal.stop();
        signal.wakeup();
    })
    .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))
}

/// Show the shutdown message before exiting the daemon loop. The backlight stays on.
pub(super) fn render_shutdown(display: &mut dyn Display) -> Result<()> {
    display.clear()?;
    display.set_backlight(true)?;
    display.display_string("offline", 0)?;
    display.display_string("", 1)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MemoryDisplay;

    #[test]
    fn shutdown_screen_reads_offline_with_light() {
        let mut display = MemoryDisplay::new(16, 2);
        display.set_backlight(false).unwrap();
        render_shutdown(&mut display).unwrap();
        assert_eq!(display.line(0).trim_end(), "offline");
        assert!(display.backlight_on());
    }
}
