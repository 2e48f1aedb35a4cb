/// Service-worker shell: runs agent commands against chrome.* and feeds results back
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use js_sys::{Function, Promise};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::WorkerGlobalScope;

use crate::agent::{Agent, AgentConfig, AgentEvent, Command, QueryPurpose, RequestId};
use crate::error::AgentError;
use crate::operations::TabMove;
use crate::presenter::{IconState, Presentation};
use crate::scheduler::{TimerCommand, TimerToken};
use crate::settings::{Settings, SettingsPatch};
use crate::tab_data::{TabId, TabInfo};

// Import JS bridge functions
#[wasm_bindgen(module = "/background.js")]
extern "C" {
    #[wasm_bindgen(catch)]
    async fn getSettings(defaults: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setSettings(patch: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn queryTabs(current_window_only: bool) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn removeTabs(tab_ids: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn moveTab(tab_id: i32, index: i32) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setIcon(state: &str) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setBadge(text: &str, color: JsValue) -> Result<JsValue, JsValue>;

    #[wasm_bindgen(catch)]
    async fn setTitle(title: &str) -> Result<JsValue, JsValue>;

    fn addBrowserListeners(dispatch: &Function, on_message: &Function);
}

#[derive(Default)]
struct ShellState {
    next_request_id: RequestId,
    pending_replies: HashMap<RequestId, Function>,
    timers: HashMap<TimerToken, i32>,
}

#[derive(Clone)]
struct Shell {
    agent: Rc<RefCell<Agent>>,
    state: Rc<RefCell<ShellState>>,
}

impl Shell {
    fn dispatch(&self, event: AgentEvent) {
        // The borrow ends before any command runs, so completions can re-enter
        let commands = self.agent.borrow_mut().handle(event);
        for command in commands {
            self.execute(command);
        }
    }

    fn dispatch_js(&self, event: JsValue) -> Result<(), String> {
        let event = from_js::<AgentEvent>(event).map_err(|e| format!("Invalid event: {}", e))?;
        self.dispatch(event);
        Ok(())
    }

    fn execute(&self, command: Command) {
        match command {
            Command::LoadSettings => {
                let shell = self.clone();
                spawn_local(async move {
                    let event = match load_settings().await {
                        Ok(settings) => AgentEvent::SettingsLoaded { settings },
                        Err(error) => AgentEvent::SettingsLoadFailed { error },
                    };
                    shell.dispatch(event);
                });
            }
            Command::QueryTabs {
                purpose,
                current_window_only,
            } => {
                let shell = self.clone();
                spawn_local(async move {
                    shell.dispatch(query_tabs(purpose, current_window_only).await);
                });
            }
            Command::RemoveTabs { tab_ids } => {
                let shell = self.clone();
                spawn_local(async move {
                    if let Err(err) = remove_tabs(&tab_ids).await {
                        shell.report(err);
                    }
                });
            }
            Command::MoveTab(tab_move) => {
                let shell = self.clone();
                spawn_local(async move {
                    if let Err(err) = move_tab(tab_move).await {
                        shell.report(err);
                    }
                });
            }
            Command::PersistSettings { patch, request_id } => {
                let shell = self.clone();
                spawn_local(async move {
                    let error = persist_settings(&patch).await.err();
                    shell.dispatch(AgentEvent::PersistCompleted { request_id, error });
                });
            }
            Command::Present(presentation) => {
                let shell = self.clone();
                spawn_local(async move {
                    if let Err(err) = show(&presentation).await {
                        shell.report(err);
                    }
                });
            }
            Command::Timer(TimerCommand::Schedule { token, delay_ms }) => {
                self.schedule_timer(token, delay_ms);
            }
            Command::Timer(TimerCommand::Cancel { token }) => {
                let handle = self.state.borrow_mut().timers.remove(&token);
                if let (Some(handle), Ok(scope)) = (handle, worker_scope()) {
                    scope.clear_timeout_with_handle(handle);
                }
            }
            Command::StartReconciliation { interval_ms } => {
                self.start_reconciliation(interval_ms);
            }
            Command::Respond {
                request_id,
                response,
            } => {
                let reply = self.state.borrow_mut().pending_replies.remove(&request_id);
                match (reply, to_js(&response)) {
                    (Some(reply), Ok(value)) => {
                        if let Err(e) = reply.call1(&JsValue::NULL, &value) {
                            log::warn!("Failed to deliver reply {}: {}", request_id, js_error(e));
                        }
                    }
                    (None, _) => log::warn!("No pending request {}", request_id),
                    (_, Err(e)) => log::error!("Failed to serialize reply {}: {}", request_id, e),
                }
            }
        }
    }

    fn report(&self, err: AgentError) {
        if let AgentError::HostApi { operation, message } = err {
            self.dispatch(AgentEvent::HostCallFailed {
                operation,
                error: message,
            });
        } else {
            log::warn!("{}", err);
        }
    }

    fn schedule_timer(&self, token: TimerToken, delay_ms: u32) {
        let scope = match worker_scope() {
            Ok(scope) => scope,
            Err(err) => {
                log::warn!("{}", err);
                return;
            }
        };

        let shell = self.clone();
        let callback = Closure::once_into_js(move || {
            shell.state.borrow_mut().timers.remove(&token);
            shell.dispatch(AgentEvent::TimerFired { token });
        });

        let scheduled =
            scope.set_timeout_with_callback_and_timeout_and_arguments_0(callback.unchecked_ref(), delay_ms as i32);
        match scheduled {
            Ok(handle) => {
                self.state.borrow_mut().timers.insert(token, handle);
            }
            Err(e) => log::warn!("setTimeout failed: {}", js_error(e)),
        }
    }

    fn start_reconciliation(&self, interval_ms: u32) {
        let scope = match worker_scope() {
            Ok(scope) => scope,
            Err(err) => {
                log::warn!("{}", err);
                return;
            }
        };

        let shell = self.clone();
        let tick = Closure::<dyn FnMut()>::new(move || shell.dispatch(AgentEvent::ReconcileTick));

        let started = scope
            .set_interval_with_callback_and_timeout_and_arguments_0(tick.as_ref().unchecked_ref(), interval_ms as i32);
        match started {
            // Lives as long as the service worker
            Ok(_) => tick.forget(),
            Err(e) => log::warn!("setInterval failed: {}", js_error(e)),
        }
    }

    fn request(&self, message: JsValue) -> Promise {
        let request_id = {
            let mut state = self.state.borrow_mut();
            state.next_request_id = state.next_request_id.wrapping_add(1);
            state.next_request_id
        };

        let promise = Promise::new(&mut |resolve, _reject| {
            self.state.borrow_mut().pending_replies.insert(request_id, resolve);
        });

        let message = from_js::<Value>(message).unwrap_or_else(|e| {
            log::warn!("Unreadable runtime message: {}", e);
            Value::Null
        });
        self.dispatch(AgentEvent::Request {
            request_id,
            message,
        });

        promise
    }
}

/// The agent as seen from the extension's service worker
#[wasm_bindgen]
pub struct BackgroundAgent {
    shell: Shell,
}

#[wasm_bindgen]
impl BackgroundAgent {
    /// `config` may be undefined; missing fields take their defaults
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<BackgroundAgent, JsValue> {
        let config = if config.is_undefined() || config.is_null() {
            AgentConfig::default()
        } else {
            from_js::<AgentConfig>(config).map_err(|e| JsValue::from_str(&format!("Invalid agent config: {}", e)))?
        };

        Ok(BackgroundAgent {
            shell: Shell {
                agent: Rc::new(RefCell::new(Agent::new(config))),
                state: Rc::new(RefCell::new(ShellState::default())),
            },
        })
    }

    /// Hook up chrome.* listeners and load the initial state
    pub fn start(&self) {
        let shell = self.shell.clone();
        let dispatch = Closure::<dyn FnMut(JsValue)>::new(move |event: JsValue| {
            if let Err(e) = shell.dispatch_js(event) {
                log::warn!("{}", e);
            }
        });

        let shell = self.shell.clone();
        let on_message = Closure::<dyn FnMut(JsValue) -> Promise>::new(move |message: JsValue| shell.request(message));

        addBrowserListeners(dispatch.as_ref().unchecked_ref(), on_message.as_ref().unchecked_ref());
        dispatch.forget();
        on_message.forget();

        self.shell.dispatch(AgentEvent::Initialize);
    }

    /// Feed one event object, e.g. `{ event: "tabRemoved", tabId: 4 }`
    pub fn dispatch(&self, event: JsValue) -> Result<(), JsValue> {
        self.shell.dispatch_js(event).map_err(|e| JsValue::from_str(&e))
    }

    /// Answer a runtime message; resolves with `{ ok, ... }`
    pub fn request(&self, message: JsValue) -> Promise {
        self.shell.request(message)
    }

    /// Current counts from the tab cache
    pub fn counts(&self) -> Result<JsValue, JsValue> {
        let counts = self.shell.agent.borrow().counts();
        to_js(&counts).map_err(|e| JsValue::from_str(&e))
    }
}

// Helper functions

async fn load_settings() -> Result<Value, String> {
    let defaults = to_js(&Settings::default())?;
    let stored = getSettings(defaults)
        .await
        .map_err(|e| AgentError::host("storage.sync.get", js_error(e)).to_string())?;
    from_js::<Value>(stored)
}

async fn query_tabs(purpose: QueryPurpose, current_window_only: bool) -> AgentEvent {
    let result = match queryTabs(current_window_only).await {
        Ok(tabs_js) => from_js::<Vec<TabInfo>>(tabs_js).map_err(|e| format!("Failed to parse tabs: {}", e)),
        Err(e) => Err(js_error(e)),
    };

    match result {
        Ok(tabs) => {
            log::debug!("Found {} tabs (currentWindowOnly: {})", tabs.len(), current_window_only);
            AgentEvent::TabsQueried { purpose, tabs }
        }
        Err(error) => AgentEvent::QueryFailed { purpose, error },
    }
}

async fn remove_tabs(tab_ids: &[TabId]) -> Result<(), AgentError> {
    let ids = to_js(&tab_ids).map_err(|e| AgentError::host("tabs.remove", e))?;
    removeTabs(ids)
        .await
        .map_err(|e| AgentError::host("tabs.remove", js_error(e)))?;
    log::info!("Closed {} duplicate tabs", tab_ids.len());
    Ok(())
}

async fn move_tab(tab_move: TabMove) -> Result<(), AgentError> {
    moveTab(tab_move.tab_id, tab_move.index)
        .await
        .map_err(|e| AgentError::host("tabs.move", js_error(e)))?;
    Ok(())
}

async fn persist_settings(patch: &SettingsPatch) -> Result<(), String> {
    let patch = to_js(patch)?;
    setSettings(patch).await.map_err(js_error)?;
    Ok(())
}

async fn show(presentation: &Presentation) -> Result<(), AgentError> {
    let icon = match presentation.icon_state {
        IconState::Active => "active",
        IconState::Inactive => "inactive",
    };
    setIcon(icon)
        .await
        .map_err(|e| AgentError::host("action.setIcon", js_error(e)))?;

    let color = to_js(&presentation.badge_color).map_err(|e| AgentError::host("action.setBadgeBackgroundColor", e))?;
    setBadge(&presentation.badge_text, color)
        .await
        .map_err(|e| AgentError::host("action.setBadgeText", js_error(e)))?;

    setTitle(&presentation.tooltip_text)
        .await
        .map_err(|e| AgentError::host("action.setTitle", js_error(e)))?;
    Ok(())
}

fn worker_scope() -> Result<WorkerGlobalScope, AgentError> {
    js_sys::global()
        .dyn_into::<WorkerGlobalScope>()
        .map_err(|_| AgentError::host("timers", "not running in a worker"))
}

/// Plain objects rather than ES Maps, so chrome.* and the popup can read them
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, String> {
    value
        .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
        .map_err(|e| format!("Failed to serialize: {:?}", e))
}

fn from_js<T: DeserializeOwned>(value: JsValue) -> Result<T, String> {
    serde_wasm_bindgen::from_value(value).map_err(|e| format!("Failed to parse: {:?}", e))
}

fn js_error(e: JsValue) -> String {
    e.as_string()
        .or_else(|| {
            js_sys::Reflect::get(&e, &JsValue::from_str("message"))
                .ok()
                .and_then(|m| m.as_string())
        })
        .unwrap_or_else(|| format!("{:?}", e))
}
