/// The background agent: typed browser events in, host commands out
///
/// `Agent` owns every piece of mutable state (tab cache, settings, debounce
/// timer) and is driven one event at a time. It never calls the browser itself;
/// each `handle` returns the commands the host shell should carry out, and the
/// shell reports completions back as further events.
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::counts::{aggregate, Counts};
use crate::error::AgentError;
use crate::messages::{CountsReport, Request, Response};
use crate::operations::{resolve, TabMove};
use crate::presenter::{present, Labels, Presentation};
use crate::scheduler::{Debouncer, TimerCommand, TimerToken};
use crate::settings::{Settings, SettingsPatch, SETTINGS_AREA};
use crate::tab_cache::TabCache;
use crate::tab_data::{TabId, TabInfo, TabRecord, WindowId};

pub type RequestId = u32;

/// Keyboard command bound to a manual close pass
pub const CLOSE_DUPLICATES_COMMAND: &str = "close-duplicates";

/// Runtime tuning, supplied by the host when the agent is created
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Quiet period after the last tab change before an automatic close pass
    pub auto_close_delay_ms: u32,
    /// Interval of the full re-sync that corrects missed events
    pub reconcile_interval_ms: u32,
    pub labels: Labels,
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            auto_close_delay_ms: 2000,
            reconcile_interval_ms: 30_000,
            labels: Labels::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Uninitialized,
    Ready,
    Recomputing,
}

/// Why a tab query was issued; echoed back with its result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum QueryPurpose {
    Reset,
    Reconcile,
    CloseDuplicates { automatic: bool },
    Counts { request_id: RequestId },
}

/// The `changeInfo` argument of `chrome.tabs.onUpdated`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

impl ChangeInfo {
    fn touches_url_or_title(&self) -> bool {
        self.url.is_some() || self.title.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum UserAction {
    ToolbarClick,
    Command { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum AgentEvent {
    Initialize,
    SettingsLoaded { settings: Value },
    SettingsLoadFailed { error: String },
    SettingsChanged { area: String },
    TabsQueried { purpose: QueryPurpose, tabs: Vec<TabInfo> },
    QueryFailed { purpose: QueryPurpose, error: String },
    TabCreated { tab: TabInfo },
    TabUpdated { tab_id: TabId, change_info: ChangeInfo, tab: TabInfo },
    TabRemoved { tab_id: TabId },
    TabReplaced { added_tab_id: TabId, removed_tab_id: TabId },
    TabActivated { tab_id: TabId, window_id: WindowId },
    ReconcileTick,
    TimerFired { token: TimerToken },
    UserAction { action: UserAction },
    Request { request_id: RequestId, message: Value },
    PersistCompleted { request_id: Option<RequestId>, error: Option<String> },
    HostCallFailed { operation: String, error: String },
}

/// Work for the host shell
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    LoadSettings,
    QueryTabs { purpose: QueryPurpose, current_window_only: bool },
    RemoveTabs { tab_ids: Vec<TabId> },
    MoveTab(TabMove),
    PersistSettings { patch: SettingsPatch, request_id: Option<RequestId> },
    Present(Presentation),
    Timer(TimerCommand),
    StartReconciliation { interval_ms: u32 },
    Respond { request_id: RequestId, response: Response },
}

pub struct Agent {
    config: AgentConfig,
    settings: Settings,
    cache: TabCache,
    phase: Phase,
    state_changed: bool,
    auto_close: Debouncer,
    last_presented: Option<Presentation>,
    reconciliation_started: bool,
    /// Windows the last full query covered, when limited to the current window
    tracked_windows: Option<BTreeSet<WindowId>>,
    /// Settings writes waiting on storage, applied once they land
    pending_writes: BTreeMap<RequestId, SettingsPatch>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Self {
        Agent {
            auto_close: Debouncer::new(config.auto_close_delay_ms),
            config,
            settings: Settings::default(),
            cache: TabCache::new(),
            phase: Phase::Uninitialized,
            state_changed: true,
            last_presented: None,
            reconciliation_started: false,
            tracked_windows: None,
            pending_writes: BTreeMap::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn cache(&self) -> &TabCache {
        &self.cache
    }

    pub fn counts(&self) -> Counts {
        aggregate(&self.cache.snapshot())
    }

    /// Process one event to completion
    pub fn handle(&mut self, event: AgentEvent) -> Vec<Command> {
        let mut commands = Vec::new();

        match event {
            AgentEvent::Initialize => {
                log::info!("Initializing duplicate tab agent");
                commands.push(Command::LoadSettings);
                if !self.reconciliation_started {
                    self.reconciliation_started = true;
                    commands.push(Command::StartReconciliation {
                        interval_ms: self.config.reconcile_interval_ms,
                    });
                }
            }
            AgentEvent::SettingsLoaded { settings } => {
                self.apply_settings(Settings::from_stored(&settings), &mut commands);
            }
            AgentEvent::SettingsLoadFailed { error } => {
                log::warn!("{}; using defaults", AgentError::ConfigLoad(error));
                self.apply_settings(Settings::default(), &mut commands);
            }
            AgentEvent::SettingsChanged { area } => {
                if area == SETTINGS_AREA {
                    commands.push(Command::LoadSettings);
                }
            }
            AgentEvent::TabsQueried { purpose, tabs } => {
                self.on_tabs_queried(purpose, &tabs, &mut commands);
            }
            AgentEvent::QueryFailed { purpose, error } => {
                let err = AgentError::host("tabs.query", error);
                log::warn!("{} ({:?})", err, purpose);
                if let QueryPurpose::Counts { request_id } = purpose {
                    commands.push(Command::Respond {
                        request_id,
                        response: Response::failed(&err),
                    });
                }
            }
            AgentEvent::TabCreated { tab } if !self.tracks(tab.window_id) => {
                log::debug!("Ignoring tab {} in untracked window {}", tab.id, tab.window_id);
            }
            AgentEvent::TabCreated { tab } => {
                log::debug!("Tab {} created: {}", tab.id, tab.url);
                self.cache.upsert(tab.id, &tab);
                self.state_changed = true;
                self.arm_auto_close(&mut commands);
            }
            AgentEvent::TabUpdated {
                tab_id,
                change_info,
                tab,
            } => {
                if change_info.touches_url_or_title() && self.tracks(tab.window_id) {
                    log::debug!("Tab {} updated: {}", tab_id, tab.url);
                    self.cache.upsert(tab_id, &tab);
                    self.state_changed = true;
                    self.arm_auto_close(&mut commands);
                }
            }
            AgentEvent::TabRemoved { tab_id } => {
                self.cache.remove(tab_id);
                self.state_changed = true;
            }
            AgentEvent::TabReplaced {
                added_tab_id,
                removed_tab_id,
            } => {
                log::debug!("Tab {} replaced by {}", removed_tab_id, added_tab_id);
                self.cache.remove(removed_tab_id);
                self.state_changed = true;
            }
            AgentEvent::TabActivated { window_id, .. } if !self.tracks(window_id) => {
                // Focus moved to another window; rebuild around it
                commands.push(self.query(QueryPurpose::Reset));
            }
            AgentEvent::TabActivated { tab_id, window_id } => {
                self.cache.activate(tab_id, window_id);
                self.state_changed = true;
            }
            AgentEvent::ReconcileTick => {
                commands.push(self.query(QueryPurpose::Reconcile));
            }
            AgentEvent::TimerFired { token } => {
                if self.auto_close.fire(token) && self.settings.auto_close {
                    commands.push(self.query(QueryPurpose::CloseDuplicates { automatic: true }));
                }
            }
            AgentEvent::UserAction { action } => match action {
                UserAction::ToolbarClick => {
                    commands.push(self.query(QueryPurpose::CloseDuplicates { automatic: false }));
                }
                UserAction::Command { name } if name == CLOSE_DUPLICATES_COMMAND => {
                    commands.push(self.query(QueryPurpose::CloseDuplicates { automatic: false }));
                }
                UserAction::Command { name } => {
                    log::debug!("Ignoring unknown command {}", name);
                }
            },
            AgentEvent::Request {
                request_id,
                message,
            } => {
                self.on_request(request_id, &message, &mut commands);
            }
            AgentEvent::PersistCompleted { request_id, error } => {
                let patch = request_id.and_then(|id| self.pending_writes.remove(&id));
                let response = match error {
                    Some(error) => {
                        let err = AgentError::host("storage.sync.set", error);
                        log::warn!("{}", err);
                        Response::failed(&err)
                    }
                    None => {
                        if let Some(patch) = patch {
                            self.apply_patch(&patch, &mut commands);
                        }
                        Response::ok()
                    }
                };
                if let Some(request_id) = request_id {
                    commands.push(Command::Respond {
                        request_id,
                        response,
                    });
                }
            }
            AgentEvent::HostCallFailed { operation, error } => {
                log::warn!("{}", AgentError::host(operation.as_str(), error));
                if operation.starts_with("action.") {
                    // Badge may be stale; push it again on the next recompute
                    self.last_presented = None;
                }
            }
        }

        self.refresh(&mut commands);
        commands
    }

    fn query(&self, purpose: QueryPurpose) -> Command {
        Command::QueryTabs {
            purpose,
            current_window_only: self.settings.current_window_only,
        }
    }

    fn tracks(&self, window_id: WindowId) -> bool {
        self.tracked_windows
            .as_ref()
            .is_none_or(|windows| windows.contains(&window_id))
    }

    fn apply_patch(&mut self, patch: &SettingsPatch, commands: &mut Vec<Command>) {
        patch.apply(&mut self.settings);
        if !self.settings.auto_close {
            commands.extend(self.auto_close.cancel_pending().map(Command::Timer));
        }
    }

    fn apply_settings(&mut self, settings: Settings, commands: &mut Vec<Command>) {
        log::info!(
            "Loaded settings: autoClose={} currentWindowOnly={} sortTabs={} badgeColor={:?}",
            settings.auto_close,
            settings.current_window_only,
            settings.sort_tabs,
            settings.badge_color
        );
        self.settings = settings;

        if !self.settings.auto_close {
            commands.extend(self.auto_close.cancel_pending().map(Command::Timer));
        }
        commands.push(self.query(QueryPurpose::Reset));
    }

    fn on_tabs_queried(&mut self, purpose: QueryPurpose, tabs: &[TabInfo], commands: &mut Vec<Command>) {
        match purpose {
            QueryPurpose::Reset | QueryPurpose::Reconcile => {
                self.cache.reset(tabs);
                self.tracked_windows = self
                    .settings
                    .current_window_only
                    .then(|| tabs.iter().map(|tab| tab.window_id).collect());
                if self.phase == Phase::Uninitialized {
                    log::info!("Tracking {} tabs", self.cache.len());
                    self.phase = Phase::Ready;
                }
                self.state_changed = true;
            }
            QueryPurpose::CloseDuplicates { automatic } => {
                if automatic && !self.settings.auto_close {
                    return;
                }

                let records: Vec<TabRecord> = tabs.iter().map(TabRecord::from).collect();
                let resolution = resolve(&records, self.settings.sort_tabs);

                if !resolution.to_close.is_empty() {
                    log::info!(
                        "Closing {} duplicate tabs ({})",
                        resolution.to_close.len(),
                        if automatic { "auto" } else { "manual" }
                    );
                    commands.push(Command::RemoveTabs {
                        tab_ids: resolution.to_close,
                    });
                }
                commands.extend(resolution.to_move.into_iter().map(Command::MoveTab));
                self.state_changed = true;
            }
            QueryPurpose::Counts { request_id } => {
                let records: Vec<TabRecord> = tabs.iter().map(TabRecord::from).collect();
                let report = CountsReport::new(aggregate(&records), self.settings.summary());
                commands.push(Command::Respond {
                    request_id,
                    response: Response::with_counts(report),
                });
            }
        }
    }

    fn on_request(&mut self, request_id: RequestId, message: &Value, commands: &mut Vec<Command>) {
        let request = match Request::from_value(message) {
            Ok(request) => request,
            Err(err) => {
                log::warn!("{}", err);
                commands.push(Command::Respond {
                    request_id,
                    response: Response::failed(&err),
                });
                return;
            }
        };

        match request {
            Request::CloseDuplicates => {
                commands.push(self.query(QueryPurpose::CloseDuplicates { automatic: false }));
                commands.push(Command::Respond {
                    request_id,
                    response: Response::ok(),
                });
            }
            Request::SetAutoClose { value } => {
                let patch = SettingsPatch::auto_close(value);
                self.pending_writes.insert(request_id, patch.clone());
                commands.push(Command::PersistSettings {
                    patch,
                    request_id: Some(request_id),
                });
            }
            Request::GetCounts => {
                commands.push(self.query(QueryPurpose::Counts { request_id }));
            }
        }
    }

    fn arm_auto_close(&mut self, commands: &mut Vec<Command>) {
        if self.settings.auto_close && self.phase != Phase::Uninitialized {
            commands.extend(self.auto_close.schedule().into_iter().map(Command::Timer));
        }
    }

    /// Recompute counts and the badge if anything changed since the last pass.
    ///
    /// Runs synchronously at the end of every event, so events arriving while
    /// Recomputing cannot happen; they simply set `state_changed` for the next pass.
    fn refresh(&mut self, commands: &mut Vec<Command>) {
        if !self.state_changed || self.phase == Phase::Uninitialized {
            return;
        }

        self.phase = Phase::Recomputing;
        let counts = self.counts();
        let presentation = present(&counts, &self.settings, &self.config.labels);
        self.state_changed = false;
        self.phase = Phase::Ready;

        if self.last_presented.as_ref() != Some(&presentation) {
            self.last_presented = Some(presentation.clone());
            commands.push(Command::Present(presentation));
        }
    }
}
