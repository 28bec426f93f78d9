use std::cell::RefCell;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use markers::{
    InMemorySurface, LocalStorageSurface, Marker, MarkerChange, MarkerError, MarkerId,
    MarkerStore, PersistenceSurface, StoreConfig, SurfaceError,
};
use wasm_bindgen::prelude::*;

// `start` can run again after a module hot swap; only the first call loads the store.
static INITIALIZED: AtomicBool = AtomicBool::new(false);
static PANIC_HOOK_SET: OnceLock<()> = OnceLock::new();

/// Where the viewer keeps its markers: `localStorage` when the page has it,
/// otherwise memory for the lifetime of the page.
#[derive(Debug)]
enum ViewerSurface {
    Local(LocalStorageSurface),
    Memory(InMemorySurface),
}

impl ViewerSurface {
    fn new() -> Self {
        match LocalStorageSurface::new() {
            Ok(s) => ViewerSurface::Local(s),
            Err(e) => {
                console_warn(&format!("localStorage unavailable ({e}); markers will not persist"));
                ViewerSurface::Memory(InMemorySurface::new())
            }
        }
    }

    fn is_persistent(&self) -> bool {
        matches!(self, ViewerSurface::Local(_))
    }
}

impl PersistenceSurface for ViewerSurface {
    fn read(&self, key: &str) -> Result<Option<String>, SurfaceError> {
        match self {
            ViewerSurface::Local(s) => s.read(key),
            ViewerSurface::Memory(s) => s.read(key),
        }
    }

    fn write(&mut self, key: &str, value: &str) -> Result<(), SurfaceError> {
        match self {
            ViewerSurface::Local(s) => s.write(key, value),
            ViewerSurface::Memory(s) => s.write(key, value),
        }
    }
}

type ViewerMarkers = MarkerStore<ViewerSurface>;

fn new_viewer_markers() -> ViewerMarkers {
    MarkerStore::new(ViewerSurface::new(), StoreConfig::default())
}

thread_local! {
    static MARKERS: RefCell<ViewerMarkers> = RefCell::new(new_viewer_markers());
}

/// Runs `f` against the store, mapping teardown (hot reload) to an error
/// instead of panicking.
fn with_markers<F, R>(f: F) -> Result<R, JsValue>
where
    F: FnOnce(&mut ViewerMarkers) -> Result<R, MarkerError>,
{
    MARKERS
        .try_with(|m| {
            let mut store = m.borrow_mut();
            f(&mut store)
        })
        .map_err(|_| JsValue::from_str("viewer state is shutting down"))?
        .map_err(marker_error_to_js)
}

/// Like [`with_markers`] for calls that write; a snapshot left unsaved
/// afterwards is reported on the console.
fn with_markers_mut<F, R>(f: F) -> Result<R, JsValue>
where
    F: FnOnce(&mut ViewerMarkers) -> Result<R, MarkerError>,
{
    with_markers(|m| {
        let out = f(m);
        if let Some(msg) = pending_write_warning(m) {
            console_warn(&msg);
        }
        out
    })
}

fn pending_write_warning<S: PersistenceSurface>(store: &MarkerStore<S>) -> Option<String> {
    if !store.has_pending_write() {
        return None;
    }
    Some(format!(
        "markers not saved to '{}' ({} failed writes); changes stay in memory until a later save succeeds",
        store.config().storage_key,
        store.persist_stats().write_failures
    ))
}

/// No subscriber is installed in the browser, so warnings the user must see
/// go straight to the console. Native builds log through `tracing`.
fn console_warn(msg: &str) {
    #[cfg(target_arch = "wasm32")]
    {
        web_sys::console::warn_1(&JsValue::from_str(msg));
    }
    #[cfg(not(target_arch = "wasm32"))]
    {
        tracing::warn!("{msg}");
    }
}

fn marker_error_to_js(e: MarkerError) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn marker_to_js(m: &Marker) -> JsValue {
    let o = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&o, &JsValue::from_str("id"), &JsValue::from_str(m.id.as_str()));
    let _ = js_sys::Reflect::set(&o, &JsValue::from_str("lng"), &JsValue::from_f64(m.lng));
    let _ = js_sys::Reflect::set(&o, &JsValue::from_str("lat"), &JsValue::from_f64(m.lat));
    let _ = js_sys::Reflect::set(&o, &JsValue::from_str("label"), &JsValue::from_str(&m.label));
    let _ = js_sys::Reflect::set(&o, &JsValue::from_str("note"), &JsValue::from_str(&m.note));
    o.into()
}

fn change_to_js(seq: u64, change: &MarkerChange) -> JsValue {
    let (kind, id, count) = match change {
        MarkerChange::Loaded { count } => ("loaded", None, Some(*count)),
        MarkerChange::Added(id) => ("added", Some(id), None),
        MarkerChange::NoteUpdated(id) => ("noteUpdated", Some(id), None),
        MarkerChange::Renamed(id) => ("renamed", Some(id), None),
        MarkerChange::Deleted(id) => ("deleted", Some(id), None),
        MarkerChange::Cleared { count } => ("cleared", None, Some(*count)),
    };
    let o = js_sys::Object::new();
    let _ = js_sys::Reflect::set(&o, &JsValue::from_str("seq"), &JsValue::from_f64(seq as f64));
    let _ = js_sys::Reflect::set(&o, &JsValue::from_str("kind"), &JsValue::from_str(kind));
    if let Some(id) = id {
        let _ = js_sys::Reflect::set(&o, &JsValue::from_str("id"), &JsValue::from_str(id.as_str()));
    }
    if let Some(count) = count {
        let _ = js_sys::Reflect::set(&o, &JsValue::from_str("count"), &JsValue::from_f64(count as f64));
    }
    o.into()
}

fn init_panic_hook() {
    PANIC_HOOK_SET.get_or_init(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = info.to_string();
            web_sys::console::error_1(&JsValue::from_str(&msg));
        }));
    });
}

#[wasm_bindgen(start)]
pub fn start() -> Result<(), JsValue> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }
    init_panic_hook();
    with_markers(|m| {
        m.initialize();
        if !m.surface().is_persistent() {
            console_warn("localStorage unavailable; markers will be lost on reload");
        }
        Ok(())
    })
}

#[wasm_bindgen]
pub fn markers_list() -> Result<JsValue, JsValue> {
    with_markers(|m| {
        let arr = js_sys::Array::new();
        for marker in m.list() {
            arr.push(&marker_to_js(marker));
        }
        Ok(arr.into())
    })
}

#[wasm_bindgen]
pub fn markers_add(
    lng: f64,
    lat: f64,
    label: Option<String>,
    note: Option<String>,
) -> Result<JsValue, JsValue> {
    with_markers_mut(|m| {
        let marker = m.add(lng, lat, label.as_deref(), note.as_deref())?;
        Ok(marker_to_js(&marker))
    })
}

#[wasm_bindgen]
pub fn markers_update_note(id: String, note: String) -> Result<JsValue, JsValue> {
    with_markers_mut(|m| {
        let marker = m.update_note(&MarkerId::new(id), &note)?;
        Ok(marker_to_js(marker))
    })
}

#[wasm_bindgen]
pub fn markers_rename(id: String, label: String) -> Result<JsValue, JsValue> {
    with_markers_mut(|m| {
        let marker = m.rename(&MarkerId::new(id), &label)?;
        Ok(marker_to_js(marker))
    })
}

#[wasm_bindgen]
pub fn markers_delete(id: String) -> Result<bool, JsValue> {
    with_markers_mut(|m| m.delete(&MarkerId::new(id)))
}

#[wasm_bindgen]
pub fn markers_clear() -> Result<u32, JsValue> {
    with_markers_mut(|m| m.clear().map(|n| n as u32))
}

/// Changes whenever the collection does; the UI polls this to re-render pins.
#[wasm_bindgen]
pub fn markers_revision() -> f64 {
    MARKERS
        .try_with(|m| m.borrow().revision() as f64)
        .unwrap_or(0.0)
}

/// Retries a snapshot write that failed earlier (e.g. after freeing quota).
#[wasm_bindgen]
pub fn markers_flush() -> Result<(), JsValue> {
    with_markers_mut(|m| m.flush())
}

/// Change events newer than `seq`, oldest first. Pass the last `seq` seen.
#[wasm_bindgen]
pub fn markers_changes_since(seq: f64) -> Result<JsValue, JsValue> {
    with_markers(|m| {
        let arr = js_sys::Array::new();
        for e in m.changes_since(seq.max(0.0) as u64) {
            arr.push(&change_to_js(e.seq, &e.payload));
        }
        Ok(arr.into())
    })
}

/// Hands over every retained change event and empties the log.
#[wasm_bindgen]
pub fn markers_drain_changes() -> Result<JsValue, JsValue> {
    with_markers(|m| {
        let arr = js_sys::Array::new();
        for e in m.drain_changes() {
            arr.push(&change_to_js(e.seq, &e.payload));
        }
        Ok(arr.into())
    })
}
