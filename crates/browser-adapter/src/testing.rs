//! Scripted in-memory [`PageDriver`] for tests in this crate and downstream
//! crates (enable the `testing` feature from dev-dependencies).
//!
//! Tests describe the page as a map from CSS selector to element hits and
//! attach effects that fire on clicks, typed input or scrolling, which is
//! enough to replay live-search narrowing, navigations and layout drift
//! without a browser.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::driver::{ElementHit, NodeRef, PageDriver};
use crate::error::DriverError;

/// A scripted state change applied when its trigger fires.
#[derive(Clone, Debug)]
pub enum FakeEffect {
    SetUrl(String),
    SetHits(String, Vec<ElementHit>),
    ClearHits(String),
}

#[derive(Default)]
struct FakeState {
    url: String,
    hits: HashMap<String, Vec<ElementHit>>,
    values: HashMap<u32, String>,

    clicked: Vec<NodeRef>,
    filled: Vec<(NodeRef, String)>,
    typed: String,
    files: Vec<(NodeRef, Vec<PathBuf>)>,
    scrolls: Vec<(String, f64)>,
    enter_presses: usize,

    click_effects: HashMap<u32, Vec<FakeEffect>>,
    // (typed char count trigger, effects, fired)
    type_effects: Vec<(usize, Vec<FakeEffect>, bool)>,
    // (scroll count trigger, effects, fired)
    scroll_effects: Vec<(usize, Vec<FakeEffect>, bool)>,
    navigate_effects: HashMap<String, Vec<FakeEffect>>,
}

/// Deterministic in-memory page.
pub struct FakeDriver {
    state: Mutex<FakeState>,
    alive: AtomicBool,
    closed: AtomicBool,
}

impl FakeDriver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(FakeState::default()),
            alive: AtomicBool::new(true),
            closed: AtomicBool::new(false),
        })
    }

    pub fn set_url(&self, url: impl Into<String>) {
        self.state.lock().url = url.into();
    }

    pub fn set_hits(&self, selector: impl Into<String>, hits: Vec<ElementHit>) {
        self.state.lock().hits.insert(selector.into(), hits);
    }

    pub fn set_value(&self, node: NodeRef, value: impl Into<String>) {
        self.state.lock().values.insert(node.0, value.into());
    }

    /// Fire `effects` when `node` is clicked.
    pub fn on_click(&self, node: NodeRef, effects: Vec<FakeEffect>) {
        self.state.lock().click_effects.insert(node.0, effects);
    }

    /// Fire `effects` once the typed text reaches `chars` characters.
    pub fn after_typed(&self, chars: usize, effects: Vec<FakeEffect>) {
        self.state.lock().type_effects.push((chars, effects, false));
    }

    /// Fire `effects` once `count` scrolls have happened.
    pub fn after_scrolls(&self, count: usize, effects: Vec<FakeEffect>) {
        self.state
            .lock()
            .scroll_effects
            .push((count, effects, false));
    }

    /// Fire `effects` when the driver navigates to exactly `url`.
    pub fn on_navigate(&self, url: impl Into<String>, effects: Vec<FakeEffect>) {
        self.state.lock().navigate_effects.insert(url.into(), effects);
    }

    /// Simulate the operator closing the browser window.
    pub fn kill(&self) {
        self.alive.store(false, Ordering::Relaxed);
    }

    pub fn was_closed(&self) -> bool {
        self.closed.load(Ordering::Relaxed)
    }

    pub fn clicked(&self) -> Vec<NodeRef> {
        self.state.lock().clicked.clone()
    }

    pub fn filled(&self) -> Vec<(NodeRef, String)> {
        self.state.lock().filled.clone()
    }

    pub fn typed(&self) -> String {
        self.state.lock().typed.clone()
    }

    pub fn files(&self) -> Vec<(NodeRef, Vec<PathBuf>)> {
        self.state.lock().files.clone()
    }

    pub fn scroll_count(&self) -> usize {
        self.state.lock().scrolls.len()
    }

    pub fn enter_presses(&self) -> usize {
        self.state.lock().enter_presses
    }
}

fn apply_effects(state: &mut FakeState, effects: &[FakeEffect]) {
    for effect in effects {
        match effect {
            FakeEffect::SetUrl(url) => state.url = url.clone(),
            FakeEffect::SetHits(selector, hits) => {
                state.hits.insert(selector.clone(), hits.clone());
            }
            FakeEffect::ClearHits(selector) => {
                state.hits.remove(selector);
            }
        }
    }
}

#[async_trait]
impl PageDriver for FakeDriver {
    async fn navigate(&self, url: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.url = url.to_string();
        if let Some(effects) = state.navigate_effects.get(url).cloned() {
            apply_effects(&mut state, &effects);
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        Ok(self.state.lock().url.clone())
    }

    async fn query(&self, selector: &str) -> Result<Vec<ElementHit>, DriverError> {
        Ok(self
            .state
            .lock()
            .hits
            .get(selector)
            .cloned()
            .unwrap_or_default())
    }

    async fn click(&self, node: NodeRef) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.clicked.push(node);
        if let Some(effects) = state.click_effects.get(&node.0).cloned() {
            apply_effects(&mut state, &effects);
        }
        Ok(())
    }

    async fn fill(&self, node: NodeRef, value: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.values.insert(node.0, value.to_string());
        state.filled.push((node, value.to_string()));
        Ok(())
    }

    async fn read_value(&self, node: NodeRef) -> Result<String, DriverError> {
        Ok(self
            .state
            .lock()
            .values
            .get(&node.0)
            .cloned()
            .unwrap_or_default())
    }

    async fn focus(&self, _node: NodeRef) -> Result<(), DriverError> {
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.typed.push_str(text);
        let typed_len = state.typed.chars().count();
        let mut pending = Vec::new();
        for (trigger, effects, fired) in state.type_effects.iter_mut() {
            if !*fired && typed_len >= *trigger {
                *fired = true;
                pending.push(effects.clone());
            }
        }
        for effects in pending {
            apply_effects(&mut state, &effects);
        }
        Ok(())
    }

    async fn press_enter(&self) -> Result<(), DriverError> {
        self.state.lock().enter_presses += 1;
        Ok(())
    }

    async fn scroll_by(&self, selector: &str, delta_y: f64) -> Result<(), DriverError> {
        let mut state = self.state.lock();
        state.scrolls.push((selector.to_string(), delta_y));
        let count = state.scrolls.len();
        let mut pending = Vec::new();
        for (trigger, effects, fired) in state.scroll_effects.iter_mut() {
            if !*fired && count >= *trigger {
                *fired = true;
                pending.push(effects.clone());
            }
        }
        for effects in pending {
            apply_effects(&mut state, &effects);
        }
        Ok(())
    }

    async fn set_files(&self, node: NodeRef, paths: &[PathBuf]) -> Result<(), DriverError> {
        self.state.lock().files.push((node, paths.to_vec()));
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Relaxed);
        self.alive.store(false, Ordering::Relaxed);
    }
}
