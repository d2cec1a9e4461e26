//! USB backend abstraction (A1).
//!
//! The stub engine (C2-C5) is written against this trait, not against
//! `rusb`/libusb directly, so the registry and pipeline tests can run
//! against [`MockBackend`] without any real hardware. [`RusbBackend`] is the
//! production implementation: it opens a device with `rusb` for descriptor
//! access and interface claiming, then drops to raw libusb calls
//! (`libusb1-sys`, the same sys crate `rusb` itself is built on) for
//! transfer allocation, async submission, and cancellation, because `rusb`'s
//! safe API only exposes synchronous, blocking transfers.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use protocol::{Direction, TransferType, UsbOutcome};
use thiserror::Error;

use crate::usb::registry::{IsoSlot, TransferHandle};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("device is no longer present")]
    NoDevice,
    #[error("endpoint {0:#04x} not found on this device")]
    UnknownEndpoint(u8),
    #[error("libusb call failed: {0}")]
    Libusb(String),
    #[error("transfer {0:?} is not in flight")]
    NotInFlight(TransferHandle),
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Everything the backend needs to submit one transfer asynchronously.
pub struct SubmitRequest {
    pub endpoint: u8,
    pub direction: Direction,
    pub transfer_type: TransferType,
    /// OUT: payload to write. IN: scratch buffer sized to
    /// `transfer_buffer_length`, filled in by the completion.
    pub buffer: Vec<u8>,
    pub timeout: Duration,
    /// Padded (requested) length of each isochronous packet, in wire order.
    /// Empty for non-ISO transfers.
    pub iso_packet_lengths: Vec<u32>,
    /// Mirrors `LIBUSB_TRANSFER_SHORT_NOT_OK`: set on IN control/bulk/
    /// interrupt transfers so a short read surfaces as an error the
    /// completion callback can map back to a clean `COMPLETED`.
    pub short_not_ok: bool,
    /// Mirrors `LIBUSB_TRANSFER_ADD_ZERO_PACKET`: set on OUT bulk transfers
    /// whose length is an exact multiple of the endpoint's max packet size.
    pub add_zero_packet: bool,
}

/// What a completed (or cancelled) transfer reports back.
#[derive(Clone)]
pub struct CompletionReport {
    pub handle: TransferHandle,
    pub outcome: UsbOutcome,
    pub actual_length: usize,
    /// The transfer buffer as the backend left it: for IN transfers this
    /// carries the bytes the device actually wrote, which the registry
    /// splices into the record so the TX pipeline can put them on the wire.
    pub buffer: Vec<u8>,
    pub iso_results: Vec<IsoSlot>,
}

/// Abstracts over "the USB library" from the spec's point of view: async
/// submit/cancel plus the two non-transfer control calls the tweaker needs.
pub trait UsbBackend: Send + Sync {
    /// Submit a transfer asynchronously. Completion is reported later via
    /// whatever completion channel the backend was constructed with — this
    /// call returns as soon as the transfer has been handed to the driver.
    fn submit_async(&self, handle: TransferHandle, request: SubmitRequest) -> BackendResult<()>;

    /// Request cancellation of an in-flight transfer. Per USB semantics
    /// this is asynchronous too: the transfer still completes (with a
    /// cancelled/error outcome) through the normal completion path.
    fn cancel(&self, handle: TransferHandle) -> BackendResult<()>;

    /// Pump the backend's event-handling loop for up to `timeout`,
    /// delivering any completions that are ready. Corresponds to
    /// `libusb_handle_events_timeout`.
    fn dispatch_events(&self, timeout: Duration) -> BackendResult<()>;

    fn clear_halt(&self, endpoint: u8) -> BackendResult<()>;

    fn set_interface_alt_setting(&self, interface: u8, alternate: u8) -> BackendResult<()>;
}

/// In-memory backend for unit and property tests: every submission
/// completes synchronously as `Completed` with the full buffer "transferred",
/// unless a test has queued a specific outcome or forced an error.
pub struct MockBackend {
    inner: Mutex<MockState>,
    clear_halt_calls: Mutex<Vec<u8>>,
    set_interface_calls: Mutex<Vec<(u8, u8)>>,
    fail_next_clear_halt: Mutex<Option<BackendError>>,
    completions: Mutex<VecDeque<CompletionReport>>,
    sink: Mutex<Option<Arc<dyn CompletionSink>>>,
}

#[derive(Default)]
struct MockState {
    in_flight: Vec<TransferHandle>,
    next_outcome: Option<UsbOutcome>,
    next_response: Option<Vec<u8>>,
    next_iso_results: Option<Vec<IsoSlot>>,
    hold_next: bool,
    held: HashMap<TransferHandle, HeldSubmission>,
}

/// A submission stashed by [`MockBackend::hold_next_submission`] instead of
/// completing inline, so a test can hold a transfer genuinely pending while
/// it exercises, e.g., an UNLINK racing its completion.
struct HeldSubmission {
    buffer: Vec<u8>,
    transfer_type: TransferType,
    iso_packet_lengths: Vec<u32>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MockState::default()),
            clear_halt_calls: Mutex::new(Vec::new()),
            set_interface_calls: Mutex::new(Vec::new()),
            fail_next_clear_halt: Mutex::new(None),
            completions: Mutex::new(VecDeque::new()),
            sink: Mutex::new(None),
        }
    }

    /// Route every future completion into `sink` as well as the local
    /// buffer `take_completions` drains. Used by engine-level tests that
    /// want completions to flow through the registry exactly as they would
    /// with a real backend.
    pub fn set_sink(&self, sink: Arc<dyn CompletionSink>) {
        *self.sink.lock().unwrap() = Some(sink);
    }

    fn report(&self, report: CompletionReport) {
        if let Some(sink) = self.sink.lock().unwrap().as_ref() {
            sink.report(CompletionReport {
                handle: report.handle,
                outcome: report.outcome,
                actual_length: report.actual_length,
                buffer: report.buffer.clone(),
                iso_results: report.iso_results.clone(),
            });
        }
        self.completions.lock().unwrap().push_back(report);
    }

    pub fn clear_halt_calls(&self) -> Vec<u8> {
        self.clear_halt_calls.lock().unwrap().clone()
    }

    pub fn set_interface_calls(&self) -> Vec<(u8, u8)> {
        self.set_interface_calls.lock().unwrap().clone()
    }

    pub fn fail_next_clear_halt(&self, err: BackendError) {
        *self.fail_next_clear_halt.lock().unwrap() = Some(err);
    }

    /// Force the next `submit_async`'s completion to report `outcome`
    /// instead of `Completed`.
    pub fn queue_outcome(&self, outcome: UsbOutcome) {
        self.inner.lock().unwrap().next_outcome = Some(outcome);
    }

    /// Make the next `submit_async`'s completion carry `data` as the bytes
    /// "read from the device", instead of the zeroed scratch buffer the
    /// request was submitted with. For a control transfer `data` is written
    /// after the 8-byte setup prefix, matching where a real device's
    /// response lands in the same buffer.
    pub fn queue_response(&self, data: Vec<u8>) {
        self.inner.lock().unwrap().next_response = Some(data);
    }

    /// Override the per-packet completion results the next isochronous
    /// submission reports, instead of the default "every packet completed
    /// in full" result.
    pub fn queue_iso_results(&self, results: Vec<IsoSlot>) {
        self.inner.lock().unwrap().next_iso_results = Some(results);
    }

    /// Make the next `submit_async` call stash its request instead of
    /// completing it inline, leaving the transfer genuinely pending until
    /// [`Self::complete_held`] or [`Self::cancel`] resolves it. Lets tests
    /// drive a race between an UNLINK and the victim transfer's completion
    /// the way a real asynchronous backend would.
    pub fn hold_next_submission(&self) {
        self.inner.lock().unwrap().hold_next = true;
    }

    /// Resolve a submission previously stashed by `hold_next_submission`
    /// with `outcome`, reporting its original buffer back.
    pub fn complete_held(&self, handle: TransferHandle, outcome: UsbOutcome) {
        let held = self.inner.lock().unwrap().held.remove(&handle);
        let Some(held) = held else { return };

        let mut buffer = held.buffer;
        let actual_length = if outcome == UsbOutcome::Completed { buffer.len() } else { 0 };
        let iso_results = if outcome == UsbOutcome::Completed {
            let mut offset = 0u32;
            held.transfer_type
                .eq(&TransferType::Isochronous)
                .then(|| {
                    held.iso_packet_lengths
                        .iter()
                        .map(|&length| {
                            let slot = IsoSlot { offset, length, actual_length: length, status: UsbOutcome::Completed };
                            offset += length;
                            slot
                        })
                        .collect()
                })
                .unwrap_or_default()
        } else {
            Vec::new()
        };
        if outcome != UsbOutcome::Completed {
            buffer.clear();
        }
        self.report(CompletionReport { handle, outcome, actual_length, buffer, iso_results });
    }

    /// Drain completions produced since the last call. Tests poll this in
    /// place of a real backend's event dispatch.
    pub fn take_completions(&self) -> Vec<CompletionReport> {
        self.completions.lock().unwrap().drain(..).collect()
    }
}

impl UsbBackend for MockBackend {
    fn submit_async(&self, handle: TransferHandle, request: SubmitRequest) -> BackendResult<()> {
        let (outcome, response, iso_override) = {
            let mut state = self.inner.lock().unwrap();
            state.in_flight.push(handle);
            if state.hold_next {
                state.hold_next = false;
                state.held.insert(
                    handle,
                    HeldSubmission {
                        buffer: request.buffer,
                        transfer_type: request.transfer_type,
                        iso_packet_lengths: request.iso_packet_lengths,
                    },
                );
                return Ok(());
            }
            (
                state.next_outcome.take().unwrap_or(UsbOutcome::Completed),
                state.next_response.take(),
                state.next_iso_results.take(),
            )
        };

        let mut buffer = request.buffer;
        let actual_length = match outcome {
            UsbOutcome::Completed => {
                if let Some(data) = response {
                    let control_offset = if request.transfer_type == TransferType::Control { 8 } else { 0 };
                    let n = data.len().min(buffer.len().saturating_sub(control_offset));
                    buffer[control_offset..control_offset + n].copy_from_slice(&data[..n]);
                    n
                } else {
                    buffer.len()
                }
            }
            _ => 0,
        };

        let iso_results = match outcome {
            UsbOutcome::Completed => iso_override.unwrap_or_else(|| {
                let mut offset = 0u32;
                request
                    .iso_packet_lengths
                    .iter()
                    .map(|&length| {
                        let slot = IsoSlot {
                            offset,
                            length,
                            actual_length: length,
                            status: UsbOutcome::Completed,
                        };
                        offset += length;
                        slot
                    })
                    .collect()
            }),
            _ => Vec::new(),
        };

        self.report(CompletionReport {
            handle,
            outcome,
            actual_length,
            buffer,
            iso_results,
        });
        Ok(())
    }

    fn cancel(&self, handle: TransferHandle) -> BackendResult<()> {
        let mut state = self.inner.lock().unwrap();
        state.in_flight.retain(|h| *h != handle);
        state.held.remove(&handle);
        drop(state);
        self.report(CompletionReport {
            handle,
            outcome: UsbOutcome::Cancelled,
            actual_length: 0,
            buffer: Vec::new(),
            iso_results: Vec::new(),
        });
        Ok(())
    }

    fn dispatch_events(&self, _timeout: Duration) -> BackendResult<()> {
        Ok(())
    }

    fn clear_halt(&self, endpoint: u8) -> BackendResult<()> {
        if let Some(err) = self.fail_next_clear_halt.lock().unwrap().take() {
            return Err(err);
        }
        self.clear_halt_calls.lock().unwrap().push(endpoint);
        Ok(())
    }

    fn set_interface_alt_setting(&self, interface: u8, alternate: u8) -> BackendResult<()> {
        self.set_interface_calls
            .lock()
            .unwrap()
            .push((interface, alternate));
        Ok(())
    }
}

/// `rusb`/libusb-backed implementation.
///
/// Descriptor access, interface claiming and the two control calls the
/// tweaker needs go through `rusb`'s safe API. Transfer submission bypasses
/// it: `rusb::DeviceHandle` only exposes blocking transfers, so we allocate
/// and fill `libusb_transfer` structs directly via `libusb1-sys` and hand
/// them to `libusb_submit_transfer`, with a C-ABI completion trampoline that
/// forwards into [`CompletionSink`].
pub struct RusbBackend {
    handle: rusb::DeviceHandle<rusb::Context>,
    context: rusb::Context,
    sink: Arc<dyn CompletionSink>,
    shutting_down: AtomicBool,
    /// Raw transfer pointers for every submission currently in flight,
    /// keyed by the handle the registry uses to identify it. Populated by
    /// `submit_async` right after a successful `libusb_submit_transfer`,
    /// and removed by the completion trampoline before it reports to the
    /// sink — so a `cancel()` racing a completion either finds the pointer
    /// (and asks libusb to cancel it, which is safe even if it is about to
    /// complete) or finds it already gone (and is a harmless no-op).
    in_flight: Arc<Mutex<HashMap<TransferHandle, RawTransfer>>>,
}

/// A `*mut libusb_transfer` is safe to hand across threads: libusb itself
/// only ever touches it from the thread driving `libusb_handle_events*`,
/// and we only ever read the pointer value here to pass it back into
/// `libusb_cancel_transfer`.
#[derive(Clone, Copy)]
struct RawTransfer(*mut libusb1_sys::libusb_transfer);
unsafe impl Send for RawTransfer {}
unsafe impl Sync for RawTransfer {}

/// Receives completions reported by the libusb callback trampoline.
/// Implemented by the engine's dispatch glue, which forwards into
/// [`crate::usb::registry::TransferRegistry::on_completion`].
pub trait CompletionSink: Send + Sync {
    fn report(&self, report: CompletionReport);
}

impl RusbBackend {
    pub fn new(
        context: rusb::Context,
        handle: rusb::DeviceHandle<rusb::Context>,
        sink: Arc<dyn CompletionSink>,
    ) -> Self {
        Self {
            handle,
            context,
            sink,
            shutting_down: AtomicBool::new(false),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn raw_handle(&self) -> *mut libusb1_sys::libusb_device_handle {
        self.handle.as_raw()
    }
}

/// Per-transfer state kept alive for the duration of a libusb transfer and
/// reclaimed by the completion trampoline. Boxed and stashed in the
/// transfer's `user_data` pointer.
struct TransferContext {
    handle: TransferHandle,
    sink: Arc<dyn CompletionSink>,
    /// Keeps the backing buffer alive; libusb only holds a raw pointer into
    /// it for the lifetime of the transfer.
    buffer: Vec<u8>,
    iso_packet_lengths: Vec<u32>,
    in_flight: Arc<Mutex<HashMap<TransferHandle, RawTransfer>>>,
}

unsafe extern "system" fn completion_trampoline(transfer: *mut libusb1_sys::libusb_transfer) {
    // SAFETY: `user_data` was set to a `Box<TransferContext>` leaked by
    // `submit_async`; libusb calls this exactly once per transfer and never
    // retains the pointer afterward, so reconstructing and dropping the box
    // here is sound.
    unsafe {
        let ctx = Box::from_raw((*transfer).user_data as *mut TransferContext);
        ctx.in_flight.lock().unwrap().remove(&ctx.handle);
        let status = (*transfer).status;
        let flags = (*transfer).flags;
        let outcome = map_libusb_status(status, flags);

        let actual_length = if ctx.iso_packet_lengths.is_empty() {
            (*transfer).actual_length.max(0) as usize
        } else {
            let count = (*transfer).num_iso_packets.max(0) as usize;
            let descs = std::slice::from_raw_parts(
                (*transfer).iso_packet_desc.as_ptr(),
                count.min(ctx.iso_packet_lengths.len()),
            );
            descs.iter().map(|d| d.actual_length as usize).sum()
        };

        let iso_results = build_iso_results(transfer, &ctx.iso_packet_lengths);

        let TransferContext { handle, sink, buffer, .. } = *ctx;
        sink.report(CompletionReport {
            handle,
            outcome,
            actual_length,
            buffer,
            iso_results,
        });

        libusb1_sys::libusb_free_transfer(transfer);
    }
}

unsafe fn build_iso_results(
    transfer: *const libusb1_sys::libusb_transfer,
    requested_lengths: &[u32],
) -> Vec<IsoSlot> {
    if requested_lengths.is_empty() {
        return Vec::new();
    }
    let mut offset = 0u32;
    let mut out = Vec::with_capacity(requested_lengths.len());
    // SAFETY: caller guarantees `transfer` is a valid, completed ISO transfer
    // with at least `requested_lengths.len()` packet descriptors.
    unsafe {
        let count = (*transfer).num_iso_packets.max(0) as usize;
        let descs = std::slice::from_raw_parts((*transfer).iso_packet_desc.as_ptr(), count);
        for (i, &length) in requested_lengths.iter().enumerate() {
            let desc = descs.get(i);
            let (actual_length, status) = match desc {
                Some(d) => (
                    d.actual_length,
                    map_libusb_status(d.status as i32, 0),
                ),
                None => (0, UsbOutcome::Error),
            };
            out.push(IsoSlot {
                offset,
                length,
                actual_length,
                status,
            });
            offset += length;
        }
    }
    out
}

/// Maps a completed `libusb_transfer`'s status (and, for `LIBUSB_TRANSFER_ERROR`,
/// whether `LIBUSB_TRANSFER_SHORT_NOT_OK` was set) onto the outcomes the
/// registry understands.
///
/// `LIBUSB_TRANSFER_ERROR` is rewritten to `Completed` when `SHORT_NOT_OK`
/// was set on the request, and left as `Error` when it was not — matching
/// the reference completion handler's literal branch, not the inverse
/// reading its surrounding comments might suggest.
fn map_libusb_status(status: i32, flags: u8) -> UsbOutcome {
    const LIBUSB_TRANSFER_COMPLETED: i32 = 0;
    const LIBUSB_TRANSFER_ERROR: i32 = 1;
    const LIBUSB_TRANSFER_TIMED_OUT: i32 = 2;
    const LIBUSB_TRANSFER_CANCELLED: i32 = 3;
    const LIBUSB_TRANSFER_STALL: i32 = 4;
    const LIBUSB_TRANSFER_NO_DEVICE: i32 = 5;
    const LIBUSB_TRANSFER_OVERFLOW: i32 = 6;
    const LIBUSB_TRANSFER_SHORT_NOT_OK: u8 = 1 << 2;

    match status {
        LIBUSB_TRANSFER_COMPLETED => UsbOutcome::Completed,
        LIBUSB_TRANSFER_ERROR => {
            if flags & LIBUSB_TRANSFER_SHORT_NOT_OK != 0 {
                UsbOutcome::Completed
            } else {
                UsbOutcome::Error
            }
        }
        LIBUSB_TRANSFER_TIMED_OUT => UsbOutcome::TimedOut,
        LIBUSB_TRANSFER_CANCELLED => UsbOutcome::Cancelled,
        LIBUSB_TRANSFER_STALL => UsbOutcome::Stall,
        LIBUSB_TRANSFER_NO_DEVICE => UsbOutcome::NoDevice,
        LIBUSB_TRANSFER_OVERFLOW => UsbOutcome::Overflow,
        _ => UsbOutcome::Error,
    }
}

impl UsbBackend for RusbBackend {
    fn submit_async(&self, handle: TransferHandle, request: SubmitRequest) -> BackendResult<()> {
        if self.shutting_down.load(Ordering::Acquire) {
            return Err(BackendError::NoDevice);
        }

        let num_iso_packets = request.iso_packet_lengths.len() as i32;
        // SAFETY: `libusb_alloc_transfer` is always safe to call; it either
        // returns a valid pointer or null.
        let transfer = unsafe { libusb1_sys::libusb_alloc_transfer(num_iso_packets) };
        if transfer.is_null() {
            return Err(BackendError::Libusb("libusb_alloc_transfer failed".into()));
        }

        let endpoint = request.endpoint
            | match request.direction {
                Direction::In => 0x80,
                Direction::Out => 0x00,
            };

        let mut flags = 0u8;
        const LIBUSB_TRANSFER_SHORT_NOT_OK: u8 = 1 << 2;
        const LIBUSB_TRANSFER_ADD_ZERO_PACKET: u8 = 1 << 6;
        if request.short_not_ok {
            flags |= LIBUSB_TRANSFER_SHORT_NOT_OK;
        }
        if request.add_zero_packet {
            flags |= LIBUSB_TRANSFER_ADD_ZERO_PACKET;
        }

        let mut ctx = Box::new(TransferContext {
            handle,
            sink: self.sink.clone(),
            buffer: request.buffer,
            iso_packet_lengths: request.iso_packet_lengths.clone(),
            in_flight: self.in_flight.clone(),
        });
        let buffer_ptr = ctx.buffer.as_mut_ptr();
        let buffer_len = ctx.buffer.len() as i32;

        // SAFETY: `transfer` was just allocated with enough iso packet slots
        // for `num_iso_packets`; `buffer_ptr` stays valid until the
        // completion trampoline runs because `ctx` (which owns it) is
        // leaked into `user_data` until then.
        unsafe {
            (*transfer).dev_handle = self.raw_handle();
            (*transfer).endpoint = endpoint;
            (*transfer).transfer_type = transfer_type_code(request.transfer_type);
            (*transfer).timeout = request.timeout.as_millis() as u32;
            (*transfer).buffer = buffer_ptr;
            (*transfer).length = buffer_len;
            (*transfer).flags = flags;
            (*transfer).callback = completion_trampoline;
            (*transfer).num_iso_packets = num_iso_packets;

            if !request.iso_packet_lengths.is_empty() {
                libusb1_sys::libusb_set_iso_packet_lengths(
                    transfer,
                    request.iso_packet_lengths[0],
                );
            }

            (*transfer).user_data = Box::into_raw(ctx) as *mut std::ffi::c_void;

            let rc = libusb1_sys::libusb_submit_transfer(transfer);
            if rc != 0 {
                // Reclaim and drop the context we just leaked; libusb will
                // not call our callback for a failed submission.
                let ctx = Box::from_raw((*transfer).user_data as *mut TransferContext);
                drop(ctx);
                libusb1_sys::libusb_free_transfer(transfer);
                return Err(BackendError::Libusb(format!(
                    "libusb_submit_transfer failed: {rc}"
                )));
            }
        }

        self.in_flight
            .lock()
            .unwrap()
            .insert(handle, RawTransfer(transfer));

        Ok(())
    }

    fn cancel(&self, handle: TransferHandle) -> BackendResult<()> {
        let raw = self.in_flight.lock().unwrap().get(&handle).copied();
        let Some(RawTransfer(transfer)) = raw else {
            // Already completed (and removed itself) before this cancel
            // request arrived; the registry will have already routed its
            // completion, so there is nothing left to do.
            return Ok(());
        };
        // SAFETY: the pointer is removed from `in_flight` by the completion
        // trampoline before the transfer is freed, so if we observed it
        // here it is either still pending or in the process of completing
        // on another thread — `libusb_cancel_transfer` is documented as
        // safe to call in both cases.
        let rc = unsafe { libusb1_sys::libusb_cancel_transfer(transfer) };
        const LIBUSB_ERROR_NOT_FOUND: i32 = -5;
        if rc == 0 || rc == LIBUSB_ERROR_NOT_FOUND {
            Ok(())
        } else {
            Err(BackendError::Libusb(format!(
                "libusb_cancel_transfer failed: {rc}"
            )))
        }
    }

    fn dispatch_events(&self, timeout: Duration) -> BackendResult<()> {
        let tv = libusb1_sys::timeval {
            tv_sec: timeout.as_secs() as _,
            tv_usec: timeout.subsec_micros() as _,
        };
        // SAFETY: `self.context` owns the libusb context backing this
        // handle; the timeval is stack-local and not retained past the call.
        let rc = unsafe {
            libusb1_sys::libusb_handle_events_timeout(
                self.context.as_raw(),
                &tv as *const _ as *mut _,
            )
        };
        const LIBUSB_ERROR_TIMEOUT: i32 = -7;
        if rc == 0 || rc == LIBUSB_ERROR_TIMEOUT {
            Ok(())
        } else {
            Err(BackendError::Libusb(format!(
                "libusb_handle_events_timeout failed: {rc}"
            )))
        }
    }

    fn clear_halt(&self, endpoint: u8) -> BackendResult<()> {
        self.handle
            .clear_halt(endpoint)
            .map_err(|e| BackendError::Libusb(e.to_string()))
    }

    fn set_interface_alt_setting(&self, interface: u8, alternate: u8) -> BackendResult<()> {
        self.handle
            .set_alternate_setting(interface, alternate)
            .map_err(|e| BackendError::Libusb(e.to_string()))
    }
}

fn transfer_type_code(t: TransferType) -> u8 {
    match t {
        TransferType::Control => 0,
        TransferType::Isochronous => 1,
        TransferType::Bulk => 2,
        TransferType::Interrupt => 3,
    }
}
