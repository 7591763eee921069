use anyhow::Result;

/// Check accessibility permission (window focusing and raising).
///
/// # Errors
/// Returns an error with grant instructions when the permission is denied
/// (macOS only).
pub fn check_accessibility_permission() -> Result<()> {
    tracing::info!("checking accessibility permission");

    #[cfg(target_os = "macos")]
    {
        let source = core_graphics::event_source::CGEventSource::new(
            core_graphics::event_source::CGEventSourceStateID::CombinedSessionState,
        );

        if source.is_err() {
            anyhow::bail!(
                "accessibility permission denied\n\n\
                Enable in: System Settings → Privacy & Security → Accessibility\n\
                Add and enable kbdcmd (or your terminal), then retry.\n"
            );
        }

        tracing::info!("accessibility permission granted");
    }

    Ok(())
}

/// Check Input Monitoring permission (event tap and key synthesis).
///
/// # Errors
/// Returns an error with grant instructions when the permission is denied
/// (macOS only).
pub fn check_input_monitoring_permission() -> Result<()> {
    tracing::info!("checking input monitoring permission");

    #[cfg(target_os = "macos")]
    {
        use core_graphics::event::CGEvent;
        use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};

        // Creating a HID-state source and a keyboard event exercises the
        // full permission chain the tap and the synthesizer depend on.
        let source = CGEventSource::new(CGEventSourceStateID::HIDSystemState).map_err(|()| {
            anyhow::anyhow!(
                "Input Monitoring permission denied\n\n\
                Enable in: System Settings → Privacy & Security → Input Monitoring\n\
                Add and enable kbdcmd (or your terminal), then retry.\n"
            )
        })?;

        CGEvent::new_keyboard_event(source, 0, true).map_err(|()| {
            anyhow::anyhow!(
                "Failed to create keyboard event - Input Monitoring may be restricted\n\n\
                Enable in: System Settings → Privacy & Security → Input Monitoring\n"
            )
        })?;

        tracing::info!("input monitoring permission granted");
    }

    Ok(())
}

/// Check every permission the tool needs. Called before any command runs;
/// a failure is fatal and never retried.
///
/// # Errors
/// Returns the first failed permission check.
pub fn check_all_permissions() -> Result<()> {
    check_accessibility_permission()?;
    check_input_monitoring_permission()?;

    tracing::info!("all permissions checked");
    Ok(())
}
