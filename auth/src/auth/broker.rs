//! Parent window lookup for the OS-native login broker.
//!
//! Only Windows ships a broker. Everywhere else the lookup yields `None` and
//! the login runs without a parent window.

/// Opaque native window handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindowHandle(pub isize);

/// Root owner window of the console or terminal hosting this process.
#[cfg(windows)]
pub fn console_window_handle() -> Option<WindowHandle> {
    use std::ffi::c_void;

    const GA_ROOTOWNER: u32 = 3;

    #[link(name = "kernel32")]
    unsafe extern "system" {
        fn GetConsoleWindow() -> *mut c_void;
    }

    #[link(name = "user32")]
    unsafe extern "system" {
        fn GetAncestor(hwnd: *mut c_void, flags: u32) -> *mut c_void;
    }

    // SAFETY: both calls take no pointers we own and return null on failure.
    let handle = unsafe {
        let console = GetConsoleWindow();
        if console.is_null() {
            return None;
        }
        GetAncestor(console, GA_ROOTOWNER)
    };

    if handle.is_null() {
        None
    } else {
        Some(WindowHandle(handle as isize))
    }
}

#[cfg(not(windows))]
pub fn console_window_handle() -> Option<WindowHandle> {
    None
}

/// Window handle to pass along with an interactive request, if the broker is wanted.
pub fn parent_window_for(use_broker: bool) -> Option<WindowHandle> {
    if !use_broker {
        return None;
    }
    let handle = console_window_handle();
    if handle.is_none() {
        log::debug!("No console window available for the login broker; continuing without one");
    }
    handle
}
