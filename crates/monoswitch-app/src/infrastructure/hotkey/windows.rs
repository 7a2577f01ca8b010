//! Windows global hotkey backend.
//!
//! `RegisterHotKey` ties a registration to the calling thread's message
//! queue, so a dedicated `hotkey-pump` thread owns every registration and
//! runs the `GetMessageW` loop.  Other threads never call the hotkey APIs
//! directly: they enqueue a command and wake the pump with
//! `PostThreadMessageW`, then block on a reply channel.
//!
//! `WM_HOTKEY` messages are translated to [`HotkeyPress`] values on an
//! unbounded channel owned by the pump thread itself, so no process-wide
//! static state is involved.
//!
//! # Safety
//!
//! This module uses `unsafe` code exclusively for Windows API FFI calls.
//! All `unsafe` blocks are annotated with `// SAFETY:` comments.

#![cfg(target_os = "windows")]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use monoswitch_core::KeyCombination;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};
use windows::Win32::Foundation::{ERROR_HOTKEY_ALREADY_REGISTERED, LPARAM, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    RegisterHotKey, UnregisterHotKey, HOT_KEY_MODIFIERS, MOD_NOREPEAT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW, MSG, PM_NOREMOVE, WM_APP,
    WM_HOTKEY, WM_QUIT, WM_USER,
};

use super::{HotkeyApiError, HotkeyBackend, HotkeyPress};

/// Message posted to the pump thread when a command is waiting.
const WM_APP_WAKE: u32 = WM_APP + 1;

/// How long a caller waits for the pump thread to answer a command.
const COMMAND_REPLY_TIMEOUT: Duration = Duration::from_secs(5);

enum PumpCommand {
    Register {
        id: i32,
        modifiers: u32,
        vk: u32,
        reply: std_mpsc::Sender<Result<(), HotkeyApiError>>,
    },
    Unregister {
        id: i32,
        reply: std_mpsc::Sender<Result<(), HotkeyApiError>>,
    },
}

/// Windows hotkey backend running a dedicated message-loop thread.
pub struct WindowsHotkeyPump {
    commands: Mutex<Option<std_mpsc::Sender<PumpCommand>>>,
    pump_thread_id: AtomicU32,
}

impl WindowsHotkeyPump {
    pub fn new() -> Self {
        Self {
            commands: Mutex::new(None),
            pump_thread_id: AtomicU32::new(0),
        }
    }

    fn send_command<F>(&self, make: F) -> Result<(), HotkeyApiError>
    where
        F: FnOnce(std_mpsc::Sender<Result<(), HotkeyApiError>>) -> PumpCommand,
    {
        let thread_id = self.pump_thread_id.load(Ordering::SeqCst);
        let commands = self.commands.lock().expect("command channel lock poisoned");
        let Some(sender) = commands.as_ref() else {
            return Err(HotkeyApiError::PumpUnavailable);
        };

        let (reply_tx, reply_rx) = std_mpsc::channel();
        sender
            .send(make(reply_tx))
            .map_err(|_| HotkeyApiError::PumpUnavailable)?;

        // SAFETY: plain message post to the pump thread's queue; the queue
        // exists because start() waited for the init handshake.
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_APP_WAKE, WPARAM(0), LPARAM(0));
        }

        reply_rx
            .recv_timeout(COMMAND_REPLY_TIMEOUT)
            .map_err(|_| HotkeyApiError::PumpUnavailable)?
    }
}

impl Default for WindowsHotkeyPump {
    fn default() -> Self {
        Self::new()
    }
}

impl HotkeyBackend for WindowsHotkeyPump {
    fn start(&self) -> Result<UnboundedReceiver<HotkeyPress>, HotkeyApiError> {
        let mut commands = self.commands.lock().expect("command channel lock poisoned");
        if commands.is_some() {
            return Err(HotkeyApiError::Os { code: -1 });
        }

        let (event_tx, event_rx) = unbounded_channel();
        let (command_tx, command_rx) = std_mpsc::channel();
        let (init_tx, init_rx) = std_mpsc::channel();

        thread::Builder::new()
            .name("hotkey-pump".to_string())
            .spawn(move || pump_loop(command_rx, event_tx, init_tx))
            .map_err(|_| HotkeyApiError::PumpUnavailable)?;

        let thread_id = init_rx
            .recv_timeout(COMMAND_REPLY_TIMEOUT)
            .map_err(|_| HotkeyApiError::PumpUnavailable)?;

        self.pump_thread_id.store(thread_id, Ordering::SeqCst);
        *commands = Some(command_tx);
        Ok(event_rx)
    }

    fn register(&self, id: i32, combo: &KeyCombination) -> Result<(), HotkeyApiError> {
        let modifiers = combo.modifiers.bits() as u32;
        let vk = combo.key.code();
        self.send_command(|reply| PumpCommand::Register {
            id,
            modifiers,
            vk,
            reply,
        })
    }

    fn unregister(&self, id: i32) -> Result<(), HotkeyApiError> {
        self.send_command(|reply| PumpCommand::Unregister { id, reply })
    }

    fn shutdown(&self) {
        let mut commands = self.commands.lock().expect("command channel lock poisoned");
        if commands.take().is_none() {
            return;
        }
        let thread_id = self.pump_thread_id.load(Ordering::SeqCst);
        // SAFETY: plain WM_QUIT post; the pump thread unregisters any
        // leftover hotkeys before exiting its loop.
        unsafe {
            let _ = PostThreadMessageW(thread_id, WM_QUIT, WPARAM(0), LPARAM(0));
        }
    }
}

/// Entry point for the dedicated hotkey message-loop thread.
fn pump_loop(
    commands: std_mpsc::Receiver<PumpCommand>,
    events: UnboundedSender<HotkeyPress>,
    init: std_mpsc::Sender<u32>,
) {
    // Ids currently registered with the OS, so they can be released if the
    // loop exits with registrations still live.
    let mut live_ids: Vec<i32> = Vec::new();

    let mut msg = MSG::default();
    // SAFETY: PeekMessageW forces creation of this thread's message queue so
    // that PostThreadMessageW from other threads cannot fail; PM_NOREMOVE
    // leaves any message in place.
    unsafe {
        let _ = PeekMessageW(&mut msg, None, WM_USER, WM_USER, PM_NOREMOVE);
    }
    // SAFETY: trivially safe; returns the current thread id.
    let thread_id = unsafe { GetCurrentThreadId() };
    if init.send(thread_id).is_err() {
        return;
    }

    loop {
        // SAFETY: standard Win32 GetMessage loop on this thread's queue.
        let got = unsafe { GetMessageW(&mut msg, None, 0, 0) };
        if !got.as_bool() {
            break; // WM_QUIT
        }
        match msg.message {
            WM_HOTKEY => {
                let id = msg.wParam.0 as i32;
                debug!(id, "hotkey pressed");
                if events.send(HotkeyPress { registration_id: id }).is_err() {
                    // Receiver gone: nobody is listening any more.
                    break;
                }
            }
            WM_APP_WAKE => {
                if drain_commands(&commands, &mut live_ids) {
                    break;
                }
            }
            _ => {
                // SAFETY: standard message dispatch for anything else.
                unsafe {
                    DispatchMessageW(&msg);
                }
            }
        }
    }

    for id in live_ids {
        // SAFETY: releasing thread-owned registrations on the owning thread.
        if let Err(e) = unsafe { UnregisterHotKey(None, id) } {
            warn!(id, error = %e, "failed to release hotkey during pump shutdown");
        }
    }
}

/// Handles every queued command.  Returns `true` when the command channel is
/// disconnected and the pump should exit.
fn drain_commands(commands: &std_mpsc::Receiver<PumpCommand>, live_ids: &mut Vec<i32>) -> bool {
    loop {
        match commands.try_recv() {
            Ok(PumpCommand::Register {
                id,
                modifiers,
                vk,
                reply,
            }) => {
                // MOD_NOREPEAT keeps a held combination from flooding the
                // queue with repeats.
                let flags = HOT_KEY_MODIFIERS(modifiers) | MOD_NOREPEAT;
                // SAFETY: registering on the thread that owns the message
                // queue, as the API requires; a null hwnd routes WM_HOTKEY to
                // this thread's queue.
                let result = match unsafe { RegisterHotKey(None, id, flags, vk) } {
                    Ok(()) => {
                        live_ids.push(id);
                        Ok(())
                    }
                    Err(e) if e.code() == ERROR_HOTKEY_ALREADY_REGISTERED.to_hresult() => {
                        Err(HotkeyApiError::Rejected)
                    }
                    Err(e) => Err(HotkeyApiError::Os { code: e.code().0 }),
                };
                let _ = reply.send(result);
            }
            Ok(PumpCommand::Unregister { id, reply }) => {
                // SAFETY: releasing a registration owned by this thread.
                let result = match unsafe { UnregisterHotKey(None, id) } {
                    Ok(()) => {
                        live_ids.retain(|&live| live != id);
                        Ok(())
                    }
                    Err(e) => Err(HotkeyApiError::Os { code: e.code().0 }),
                };
                let _ = reply.send(result);
            }
            Err(std_mpsc::TryRecvError::Empty) => return false,
            Err(std_mpsc::TryRecvError::Disconnected) => return true,
        }
    }
}
