//! Raw FSEvents `EventSource` adapter. Isolates the unsafe OS callback
//! boundary: the callback receives opaque handles and arrays of C
//! strings/flags/ids, and is translated here into the safe `RawEvent`
//! channel the rest of the monitor consumes.

use super::{stream_create_error, stream_start_error, EventFlags, EventId, EventSource, RawEvent};
use crate::error::SeekError;
use fsevent_sys as fs;
use fsevent_sys::core_foundation as cf;
use fsevent_sys::core_foundation::CFRunLoopRef;
use parking_lot::Mutex;
use std::ffi::CStr;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

const LATENCY_SECONDS: cf::CFTimeInterval = 0.3;

struct CallbackInfo {
    tx: mpsc::Sender<RawEvent>,
}

extern "C" {
    fn CFRunLoopIsWaiting(runloop: CFRunLoopRef) -> cf::Boolean;
}

extern "C" fn stream_callback(
    _stream_ref: fs::FSEventStreamRef,
    info: *mut std::os::raw::c_void,
    num_events: usize,
    event_paths: *mut std::os::raw::c_void,
    event_flags: *const fs::FSEventStreamEventFlags,
    event_ids: *const fs::FSEventStreamEventId,
) {
    unsafe {
        let info = &*(info as *const CallbackInfo);
        let paths_ptr = event_paths as *const *const std::os::raw::c_char;

        for i in 0..num_events {
            let flag = *event_flags.add(i);
            let event_id = *event_ids.add(i);
            let c_str = CStr::from_ptr(*paths_ptr.add(i));
            let path = PathBuf::from(c_str.to_string_lossy().into_owned());

            let mut bits = 0u32;
            if flag & fs::kFSEventStreamEventFlagHistoryDone != 0 {
                bits |= EventFlags::HISTORY_DONE;
            }
            if flag & fs::kFSEventStreamEventFlagRootChanged != 0 {
                bits |= EventFlags::ROOT_CHANGED;
            }
            if flag & fs::kFSEventStreamEventFlagMustScanSubDirs != 0 {
                bits |= EventFlags::MUST_SCAN_SUB_DIRS;
            }
            if flag & fs::kFSEventStreamEventFlagKernelDropped != 0 {
                bits |= EventFlags::KERNEL_DROPPED;
            }
            if flag & fs::kFSEventStreamEventFlagUserDropped != 0 {
                bits |= EventFlags::USER_DROPPED;
            }
            if flag & fs::kFSEventStreamEventFlagItemIsDir != 0 {
                bits |= EventFlags::ITEM_IS_DIR;
            }
            if flag & fs::kFSEventStreamEventFlagItemCreated != 0 {
                bits |= EventFlags::ITEM_CREATED;
            }
            if flag & fs::kFSEventStreamEventFlagItemRemoved != 0 {
                bits |= EventFlags::ITEM_REMOVED;
            }
            if flag & fs::kFSEventStreamEventFlagItemRenamed != 0 {
                bits |= EventFlags::ITEM_RENAMED;
            }

            let _ = info.tx.send(RawEvent {
                path,
                flags: EventFlags(bits),
                event_id: event_id as EventId,
            });
        }
    }
}

struct StreamHandle {
    run_loop_ref: Option<cf::CFRunLoopRef>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

unsafe impl Send for StreamHandle {}

pub struct FsEventSource {
    handle: Mutex<Option<StreamHandle>>,
}

impl Default for FsEventSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FsEventSource {
    pub fn new() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    fn create_stream(
        root: &std::path::Path,
        since_when: fs::FSEventStreamEventId,
        tx: mpsc::Sender<RawEvent>,
    ) -> Result<StreamHandle, SeekError> {
        let root_str = root
            .to_str()
            .ok_or_else(|| stream_create_error("root path is not valid UTF-8"))?;

        let context_info = Box::new(CallbackInfo { tx });
        let context_ptr = Box::into_raw(context_info);

        let stream_context = fs::FSEventStreamContext {
            version: 0,
            info: context_ptr as *mut std::os::raw::c_void,
            retain: None,
            release: None,
            copy_description: None,
        };

        let flags = fs::kFSEventStreamCreateFlagFileEvents | fs::kFSEventStreamCreateFlagNoDefer;

        let stream = unsafe {
            let c_path = std::ffi::CString::new(root_str)
                .map_err(|e| stream_create_error(e.to_string()))?;
            let cf_string = cf::CFStringCreateWithCString(
                cf::kCFAllocatorDefault,
                c_path.as_ptr(),
                cf::kCFStringEncodingUTF8,
            );
            if cf_string.is_null() {
                drop(Box::from_raw(context_ptr));
                return Err(stream_create_error("failed to create CFString for root path"));
            }

            let cf_array =
                cf::CFArrayCreateMutable(cf::kCFAllocatorDefault, 0, &cf::kCFTypeArrayCallBacks);
            cf::CFArrayAppendValue(cf_array, cf_string);
            cf::CFRelease(cf_string);

            let s = fs::FSEventStreamCreate(
                cf::kCFAllocatorDefault,
                stream_callback,
                &stream_context,
                cf_array,
                since_when,
                LATENCY_SECONDS,
                flags,
            );
            cf::CFRelease(cf_array);

            if s.is_null() {
                drop(Box::from_raw(context_ptr));
                return Err(stream_create_error("FSEventStreamCreate returned null"));
            }
            s
        };

        let stream_addr = stream as usize;
        let context_addr = context_ptr as usize;
        let (rl_tx, rl_rx) = std::sync::mpsc::channel::<usize>();

        let thread_handle = thread::Builder::new()
            .name("seek-fsevents".to_string())
            .spawn(move || unsafe {
                let stream = stream_addr as *mut std::os::raw::c_void;
                let context_ptr = context_addr as *mut CallbackInfo;
                let cur_runloop = cf::CFRunLoopGetCurrent();
                fs::FSEventStreamScheduleWithRunLoop(
                    stream,
                    cur_runloop,
                    cf::kCFRunLoopDefaultMode,
                );
                fs::FSEventStreamStart(stream);
                let _ = rl_tx.send(cur_runloop as usize);

                cf::CFRunLoopRun();

                fs::FSEventStreamStop(stream);
                fs::FSEventStreamInvalidate(stream);
                fs::FSEventStreamRelease(stream);
                drop(Box::from_raw(context_ptr));
            })
            .map_err(|e| stream_start_error(e.to_string()))?;

        let run_loop_ref = rl_rx
            .recv()
            .map_err(|_| stream_start_error("FSEvents thread terminated before startup"))?
            as *mut std::os::raw::c_void;

        Ok(StreamHandle {
            run_loop_ref: Some(run_loop_ref),
            thread_handle: Some(thread_handle),
        })
    }
}

impl EventSource for FsEventSource {
    fn start(
        &self,
        roots: &[PathBuf],
        since: Option<EventId>,
        tx: mpsc::Sender<RawEvent>,
    ) -> Result<(), SeekError> {
        // The FSEvents API accepts one path array per stream; a single
        // shared root (the common case) is watched directly. Multiple
        // independent roots would need one stream each, mirrored by a
        // small Vec of StreamHandles — out of scope for this adapter's
        // current callers, which always pass one root.
        let root = roots
            .first()
            .ok_or_else(|| stream_create_error("no roots given to monitor"))?;
        let since_when = since
            .map(|id| id as fs::FSEventStreamEventId)
            .unwrap_or(fs::kFSEventStreamEventIdSinceNow);
        let handle = Self::create_stream(root, since_when, tx)?;
        *self.handle.lock() = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        if let Some(mut handle) = self.handle.lock().take() {
            if let Some(rl) = handle.run_loop_ref.take() {
                unsafe {
                    while CFRunLoopIsWaiting(rl) == 0 {
                        thread::yield_now();
                    }
                    cf::CFRunLoopStop(rl);
                }
                if let Some(join_handle) = handle.thread_handle.take() {
                    let _ = join_handle.join();
                }
            }
        }
    }

    fn is_event_id_valid(&self, id: EventId, roots: &[PathBuf]) -> bool {
        let Some(root) = roots.first() else {
            return false;
        };
        let (probe_tx, _probe_rx) = mpsc::channel();
        match Self::create_stream(root, id as fs::FSEventStreamEventId, probe_tx) {
            Ok(mut handle) => {
                if let Some(rl) = handle.run_loop_ref.take() {
                    unsafe {
                        while CFRunLoopIsWaiting(rl) == 0 {
                            thread::yield_now();
                        }
                        cf::CFRunLoopStop(rl);
                    }
                }
                if let Some(join_handle) = handle.thread_handle.take() {
                    let _ = join_handle.join();
                }
                true
            }
            Err(_) => false,
        }
    }
}

unsafe impl Send for FsEventSource {}
unsafe impl Sync for FsEventSource {}
