//! macOS workspace implementation.
//!
//! Enumeration goes through the CoreGraphics window list; application
//! activation goes through AppKit's `NSRunningApplication`; raising a window
//! inside its application uses the Accessibility API. Launching defers to
//! `/usr/bin/open`, which handles bundles, re-opens, and Launch Services
//! quirks in one place.

use std::{ffi::c_void, path::Path, process::Command};

use core_foundation::{
    array::{CFArray, CFArrayRef},
    base::{CFType, TCFType},
    dictionary::{CFDictionary, CFDictionaryRef},
    number::CFNumber,
    string::{CFString, CFStringRef},
};
use core_graphics::{
    geometry::CGRect,
    window::{
        self, kCGNullWindowID, kCGWindowBounds, kCGWindowLayer, kCGWindowListExcludeDesktopElements,
        kCGWindowListOptionOnScreenOnly, kCGWindowName, kCGWindowNumber, kCGWindowOwnerName,
        kCGWindowOwnerPID,
    },
};
use objc2_app_kit::{NSApplicationActivationOptions, NSRunningApplication, NSWorkspace};
use tracing::{debug, warn};

use super::{AppInfo, WindowId, WindowInfo, Workspace, WorkspaceError};

/// Windows smaller than this on either axis are decorations, not targets.
const MIN_WINDOW_DIMENSION: f64 = 60.0;

type AXUIElementRef = *const c_void;
type CFTypeRef = *const c_void;

const AX_SUCCESS: i32 = 0;

#[link(name = "ApplicationServices", kind = "framework")]
extern "C" {
    fn AXUIElementCreateApplication(pid: i32) -> AXUIElementRef;
    fn AXUIElementCopyAttributeValue(
        element: AXUIElementRef,
        attribute: CFStringRef,
        value: *mut CFTypeRef,
    ) -> i32;
    fn AXUIElementPerformAction(element: AXUIElementRef, action: CFStringRef) -> i32;
}

#[link(name = "CoreGraphics", kind = "framework")]
extern "C" {
    fn CGWindowListCreateDescriptionFromArray(window_array: CFArrayRef) -> CFArrayRef;
    fn CFRelease(cf: CFTypeRef);
}

fn dict_i64(dict: &CFDictionary<CFString, CFType>, key: CFStringRef) -> Option<i64> {
    let key = unsafe { CFString::wrap_under_get_rule(key) };
    dict.find(&key)?.downcast::<CFNumber>()?.to_i64()
}

fn dict_string(dict: &CFDictionary<CFString, CFType>, key: CFStringRef) -> Option<String> {
    let key = unsafe { CFString::wrap_under_get_rule(key) };
    Some(dict.find(&key)?.downcast::<CFString>()?.to_string())
}

fn dict_bounds(dict: &CFDictionary<CFString, CFType>) -> Option<CGRect> {
    let key = unsafe { CFString::wrap_under_get_rule(kCGWindowBounds) };
    let bounds = dict.find(&key)?.downcast::<CFDictionary>()?;
    CGRect::from_dict_representation(&bounds)
}

/// Parses one CG window description into [`WindowInfo`], applying the
/// ordinary-window filters (layer zero, minimum size, not the system window
/// manager).
fn parse_window(dict: &CFDictionary<CFString, CFType>) -> Option<WindowInfo> {
    let layer = unsafe { dict_i64(dict, kCGWindowLayer) }?;
    if layer != 0 {
        return None;
    }
    if let Some(bounds) = dict_bounds(dict) {
        if bounds.size.width < MIN_WINDOW_DIMENSION || bounds.size.height < MIN_WINDOW_DIMENSION {
            return None;
        }
    }
    let id = unsafe { dict_i64(dict, kCGWindowNumber) }?;
    let pid = unsafe { dict_i64(dict, kCGWindowOwnerPID) }?;
    let app_name = unsafe { dict_string(dict, kCGWindowOwnerName) }.unwrap_or_default();
    if app_name == "WindowManager" {
        return None;
    }
    let title = unsafe { dict_string(dict, kCGWindowName) }.unwrap_or_default();
    Some(WindowInfo {
        id: WindowId::try_from(id).ok()?,
        pid: i32::try_from(pid).ok()?,
        title,
        app_name,
    })
}

/// Lists ordinary on-screen windows, front to back.
fn on_screen_windows() -> Vec<WindowInfo> {
    let Some(descriptions) = window::copy_window_info(
        kCGWindowListOptionOnScreenOnly | kCGWindowListExcludeDesktopElements,
        kCGNullWindowID,
    ) else {
        warn!("window list unavailable");
        return Vec::new();
    };
    descriptions
        .iter()
        .filter_map(|item| {
            let dict = unsafe {
                CFDictionary::<CFString, CFType>::wrap_under_get_rule(*item as CFDictionaryRef)
            };
            parse_window(&dict)
        })
        .collect()
}

fn app_info(app: &NSRunningApplication) -> AppInfo {
    let (pid, is_active) = unsafe { (app.processIdentifier(), app.isActive()) };
    AppInfo { pid, is_active }
}

fn running_app_with_pid(pid: i32) -> Option<objc2::rc::Retained<NSRunningApplication>> {
    unsafe { NSRunningApplication::runningApplicationWithProcessIdentifier(pid) }
}

/// Raises an Accessibility window element.
fn ax_raise(element: AXUIElementRef) -> Result<(), WorkspaceError> {
    let action = CFString::from_static_string("AXRaise");
    let status = unsafe { AXUIElementPerformAction(element, action.as_concrete_TypeRef()) };
    if status == AX_SUCCESS {
        Ok(())
    } else {
        Err(WorkspaceError::Platform(format!(
            "AXRaise failed with status {status}"
        )))
    }
}

/// Copies an application's Accessibility window elements.
fn ax_windows(pid: i32) -> Result<CFArray<*const c_void>, WorkspaceError> {
    let app = unsafe { AXUIElementCreateApplication(pid) };
    if app.is_null() {
        return Err(WorkspaceError::Platform(format!(
            "no accessibility element for pid {pid}"
        )));
    }
    let attribute = CFString::from_static_string("AXWindows");
    let mut value: CFTypeRef = std::ptr::null();
    let status =
        unsafe { AXUIElementCopyAttributeValue(app, attribute.as_concrete_TypeRef(), &mut value) };
    unsafe { CFRelease(app) };
    if status != AX_SUCCESS || value.is_null() {
        return Err(WorkspaceError::Platform(format!(
            "AXWindows unavailable for pid {pid} (status {status})"
        )));
    }
    Ok(unsafe { CFArray::wrap_under_create_rule(value as CFArrayRef) })
}

fn ax_window_title(element: AXUIElementRef) -> Option<String> {
    let attribute = CFString::from_static_string("AXTitle");
    let mut value: CFTypeRef = std::ptr::null();
    let status = unsafe {
        AXUIElementCopyAttributeValue(element, attribute.as_concrete_TypeRef(), &mut value)
    };
    if status != AX_SUCCESS || value.is_null() {
        return None;
    }
    let title = unsafe { CFString::wrap_under_create_rule(value as CFStringRef) };
    Some(title.to_string())
}

/// The canonical macOS [`Workspace`] implementation.
pub struct MacWorkspace;

impl Workspace for MacWorkspace {
    fn frontmost_app(&self) -> Option<AppInfo> {
        let workspace = unsafe { NSWorkspace::sharedWorkspace() };
        let front = unsafe { workspace.frontmostApplication() }?;
        Some(app_info(&front))
    }

    fn running_app_at(&self, path: &Path) -> Option<AppInfo> {
        let workspace = unsafe { NSWorkspace::sharedWorkspace() };
        let apps = unsafe { workspace.runningApplications() };
        for app in apps.iter() {
            let bundle_path = unsafe { app.bundleURL() }
                .and_then(|url| unsafe { url.path() })
                .map(|p| p.to_string());
            if bundle_path.as_deref() == path.to_str() {
                return Some(app_info(&app));
            }
        }
        None
    }

    fn windows_for(&self, pid: i32) -> Vec<WindowInfo> {
        on_screen_windows()
            .into_iter()
            .filter(|w| w.pid == pid)
            .collect()
    }

    fn foreground_window(&self) -> Result<WindowInfo, WorkspaceError> {
        let front = self.frontmost_app().ok_or(WorkspaceError::NoFrontmostApp)?;
        self.windows_for(front.pid)
            .into_iter()
            .next()
            .ok_or_else(|| {
                WorkspaceError::Platform(format!("no on-screen window for pid {}", front.pid))
            })
    }

    fn raise_window(&self, window: &WindowInfo) -> Result<(), WorkspaceError> {
        let elements = ax_windows(window.pid)?;
        if elements.len() == 0 {
            return Err(WorkspaceError::WindowNotFound(window.id));
        }
        // CG window ids and AX elements live in different namespaces; match
        // by title when one is available, otherwise raise the app's first
        // window.
        let mut fallback: Option<AXUIElementRef> = None;
        for element in elements.iter() {
            let element = *element;
            if fallback.is_none() {
                fallback = Some(element);
            }
            if !window.title.is_empty() && ax_window_title(element).as_deref() == Some(&window.title)
            {
                return ax_raise(element);
            }
        }
        match fallback {
            Some(element) => ax_raise(element),
            None => Err(WorkspaceError::WindowNotFound(window.id)),
        }
    }

    fn activate_app(&self, pid: i32) -> Result<(), WorkspaceError> {
        let app = running_app_with_pid(pid)
            .ok_or_else(|| WorkspaceError::Platform(format!("no running application {pid}")))?;
        let activated = unsafe {
            app.activateWithOptions(NSApplicationActivationOptions::ActivateIgnoringOtherApps)
        };
        if activated {
            Ok(())
        } else {
            Err(WorkspaceError::Platform(format!(
                "activation refused for pid {pid}"
            )))
        }
    }

    fn activate_window(&self, id: WindowId) -> Result<(), WorkspaceError> {
        // Describe-by-id works for windows on any desktop, unlike the
        // on-screen list.
        let ids = CFArray::from_CFTypes(&[CFNumber::from(i64::from(id))]);
        let descriptions = unsafe { CGWindowListCreateDescriptionFromArray(ids.as_concrete_TypeRef()) };
        if descriptions.is_null() {
            return Err(WorkspaceError::WindowNotFound(id));
        }
        let descriptions: CFArray<*const c_void> =
            unsafe { CFArray::wrap_under_create_rule(descriptions) };
        let pid = descriptions.iter().find_map(|item| {
            let dict = unsafe {
                CFDictionary::<CFString, CFType>::wrap_under_get_rule(*item as CFDictionaryRef)
            };
            unsafe { dict_i64(&dict, kCGWindowOwnerPID) }
        });
        match pid {
            Some(pid) => {
                debug!(window = id, pid, "activating marked window's application");
                self.activate_app(i32::try_from(pid).map_err(|_| {
                    WorkspaceError::Platform(format!("bad owner pid {pid} for window {id}"))
                })?)
            }
            None => Err(WorkspaceError::WindowNotFound(id)),
        }
    }

    fn launch(&self, path: &Path) -> Result<(), WorkspaceError> {
        let status = Command::new("/usr/bin/open")
            .arg(path)
            .status()
            .map_err(|e| WorkspaceError::Launch {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        if status.success() {
            Ok(())
        } else {
            Err(WorkspaceError::Launch {
                path: path.to_path_buf(),
                reason: format!("open exited with {status}"),
            })
        }
    }
}
