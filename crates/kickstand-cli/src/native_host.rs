use std::ffi::OsStr;
use std::iter::once;
use std::os::windows::ffi::OsStrExt;
use std::os::windows::process::CommandExt;
use std::path::Path;
use std::ptr::null;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Once};
use std::thread::{self, JoinHandle};

use anyhow::Result;
use kickstand_core::Transfer;
use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{HWND, LPARAM, LRESULT, WPARAM};
use windows_sys::Win32::Graphics::Gdi::COLOR_BTNFACE;
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::UI::Controls::{
    InitCommonControlsEx, ICC_PROGRESS_CLASS, INITCOMMONCONTROLSEX, PBM_SETPOS, PBM_SETRANGE32,
};
use windows_sys::Win32::UI::Shell::SetCurrentProcessExplicitAppUserModelID;
use windows_sys::Win32::UI::WindowsAndMessaging::{
    CreateWindowExW, DefWindowProcW, DestroyWindow, DispatchMessageW, GetMessageW, MessageBoxW,
    PostMessageW, PostQuitMessage, RegisterClassW, SendMessageW, SetWindowTextW, TranslateMessage,
    CW_USEDEFAULT, MB_ICONERROR, MB_OK, MSG, WM_APP, WM_CLOSE, WM_DESTROY, WNDCLASSW, WS_CAPTION,
    WS_CHILD, WS_OVERLAPPED, WS_SYSMENU, WS_VISIBLE,
};

use crate::host::{protocol_registration_commands, run_command, HostIntegration};
use crate::render::ProgressDialog;

const CREATE_NO_WINDOW: u32 = 0x0800_0000;
const WINDOW_CLASS: &str = "KickstandProgress";
const WM_DIALOG_CLOSE: u32 = WM_APP + 1;

static DIALOG_DISMISSED: AtomicBool = AtomicBool::new(false);
static REGISTER_CLASS: Once = Once::new();

#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct NativeHost;

impl HostIntegration for NativeHost {
    fn set_app_identity(&self, identity: &str) {
        let wide = wide(identity);
        let result = unsafe { SetCurrentProcessExplicitAppUserModelID(wide.as_ptr()) };
        if result != 0 {
            warn!(identity, hresult = result, "failed to set app user model id");
        }
    }

    fn show_error(&self, title: &str, message: &str) {
        eprintln!("{message}");
        let text = wide(message);
        let caption = wide(title);
        unsafe {
            MessageBoxW(0, text.as_ptr(), caption.as_ptr(), MB_OK | MB_ICONERROR);
        }
    }

    fn progress_dialog(&self, title: &str) -> Option<Box<dyn ProgressDialog>> {
        Some(Box::new(NativeProgressDialog::new(title)))
    }

    fn register_protocol(&self, scheme: &str, app_name: &str, exe: &Path) -> Result<()> {
        for mut command in protocol_registration_commands(scheme, app_name, exe) {
            command.creation_flags(CREATE_NO_WINDOW);
            run_command(&mut command, "failed to register protocol handler")?;
        }
        debug!(scheme, "registered protocol handler");
        Ok(())
    }
}

/// Small top-level window with a text line and a progress bar. Created on
/// first use so fully provisioned launches never flash a window.
///
/// The window lives on its own thread, which pumps messages for as long as
/// the dialog is open; updates from the launcher thread are cross-thread
/// sends that the UI thread services between its own messages.
struct NativeProgressDialog {
    title: String,
    ui: Option<DialogThread>,
    unavailable: bool,
}

struct DialogThread {
    window: HWND,
    label: HWND,
    bar: HWND,
    thread: JoinHandle<()>,
}

#[derive(Debug, Clone, Copy)]
struct DialogHandles {
    window: HWND,
    label: HWND,
    bar: HWND,
}

impl NativeProgressDialog {
    fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ui: None,
            unavailable: false,
        }
    }

    fn ensure_window(&mut self) -> Option<&DialogThread> {
        if self.ui.is_none() && !self.unavailable {
            self.ui = spawn_dialog_thread(&self.title);
            self.unavailable = self.ui.is_none();
        }
        self.ui.as_ref()
    }
}

impl ProgressDialog for NativeProgressDialog {
    fn set_text(&mut self, text: &str) {
        let Some(ui) = self.ensure_window() else {
            return;
        };
        let text = wide(text);
        unsafe {
            SetWindowTextW(ui.label, text.as_ptr());
        }
    }

    fn set_value(&mut self, value: u8) -> Transfer {
        if let Some(ui) = self.ensure_window() {
            unsafe {
                SendMessageW(ui.bar, PBM_SETPOS, usize::from(value), 0);
            }
        }
        if DIALOG_DISMISSED.load(Ordering::SeqCst) {
            Transfer::Abort
        } else {
            Transfer::Continue
        }
    }

    fn close(&mut self) {
        let Some(ui) = self.ui.take() else {
            return;
        };
        let posted = unsafe { PostMessageW(ui.window, WM_DIALOG_CLOSE, 0, 0) };
        if posted == 0 {
            warn!("failed to close progress window");
            return;
        }
        if ui.thread.join().is_err() {
            warn!("progress window thread panicked");
        }
    }
}

impl Drop for NativeProgressDialog {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_dialog_thread(title: &str) -> Option<DialogThread> {
    let title = wide(title);
    let (ready_tx, ready_rx) = mpsc::channel();
    let thread = thread::Builder::new()
        .name("progress-dialog".to_string())
        .spawn(move || {
            let handles = unsafe { create_dialog_window(&title) };
            let created = handles.is_some();
            let _ = ready_tx.send(handles);
            if created {
                run_message_loop();
            }
        });
    let thread = match thread {
        Ok(thread) => thread,
        Err(err) => {
            warn!(error = %err, "failed to start progress window thread");
            return None;
        }
    };

    match ready_rx.recv() {
        Ok(Some(handles)) => Some(DialogThread {
            window: handles.window,
            label: handles.label,
            bar: handles.bar,
            thread,
        }),
        _ => {
            warn!("failed to create progress window");
            let _ = thread.join();
            None
        }
    }
}

/// Must run on the thread that will pump the window's messages.
unsafe fn create_dialog_window(title: &[u16]) -> Option<DialogHandles> {
    let class_name = wide(WINDOW_CLASS);
    let static_class = wide("STATIC");
    let progress_class = wide("msctls_progress32");
    let instance = GetModuleHandleW(null());
    REGISTER_CLASS.call_once(|| {
        let controls = INITCOMMONCONTROLSEX {
            dwSize: std::mem::size_of::<INITCOMMONCONTROLSEX>() as u32,
            dwICC: ICC_PROGRESS_CLASS,
        };
        InitCommonControlsEx(&controls);

        let mut class: WNDCLASSW = std::mem::zeroed();
        class.lpfnWndProc = Some(window_proc);
        class.hInstance = instance;
        class.hbrBackground = (COLOR_BTNFACE + 1) as _;
        class.lpszClassName = class_name.as_ptr();
        RegisterClassW(&class);
    });

    let window = CreateWindowExW(
        0,
        class_name.as_ptr(),
        title.as_ptr(),
        WS_OVERLAPPED | WS_CAPTION | WS_SYSMENU | WS_VISIBLE,
        CW_USEDEFAULT,
        CW_USEDEFAULT,
        440,
        130,
        0,
        0,
        instance,
        null(),
    );
    if window == 0 {
        return None;
    }

    let label = CreateWindowExW(
        0,
        static_class.as_ptr(),
        null(),
        WS_CHILD | WS_VISIBLE,
        16,
        14,
        392,
        20,
        window,
        0,
        instance,
        null(),
    );
    let bar = CreateWindowExW(
        0,
        progress_class.as_ptr(),
        null(),
        WS_CHILD | WS_VISIBLE,
        16,
        44,
        392,
        22,
        window,
        0,
        instance,
        null(),
    );
    SendMessageW(bar, PBM_SETRANGE32, 0, 100);
    Some(DialogHandles { window, label, bar })
}

unsafe extern "system" fn window_proc(
    window: HWND,
    message: u32,
    wparam: WPARAM,
    lparam: LPARAM,
) -> LRESULT {
    match message {
        // The close box only requests an abort; the launcher decides when to tear down.
        WM_CLOSE => {
            DIALOG_DISMISSED.store(true, Ordering::SeqCst);
            0
        }
        WM_DIALOG_CLOSE => {
            DestroyWindow(window);
            0
        }
        WM_DESTROY => {
            PostQuitMessage(0);
            0
        }
        _ => DefWindowProcW(window, message, wparam, lparam),
    }
}

fn run_message_loop() {
    unsafe {
        let mut message: MSG = std::mem::zeroed();
        while GetMessageW(&mut message, 0, 0, 0) > 0 {
            TranslateMessage(&message);
            DispatchMessageW(&message);
        }
    }
}

fn wide(value: &str) -> Vec<u16> {
    OsStr::new(value).encode_wide().chain(once(0)).collect()
}
