//! Event sequences driven through `Agent::handle`, as the service worker would feed them

use duplicate_tab_closer::agent::{
    Agent, AgentConfig, AgentEvent, Command, Phase, QueryPurpose, UserAction, CLOSE_DUPLICATES_COMMAND,
};
use duplicate_tab_closer::error::AgentError;
use duplicate_tab_closer::messages::Response;
use duplicate_tab_closer::operations::TabMove;
use duplicate_tab_closer::presenter::{IconState, Presentation};
use duplicate_tab_closer::scheduler::TimerCommand;
use duplicate_tab_closer::settings::{BadgeColor, SettingsPatch};
use duplicate_tab_closer::tab_data::TabInfo;
use serde_json::{json, Value};

const SUSPENDED_EXAMPLE: &str = "chrome-extension://x/suspended.html#uri=https%3A%2F%2Fexample.com";

fn scenario_a_tabs() -> Vec<TabInfo> {
    vec![
        TabInfo::new(1, "https://a.com", "A", 1),
        TabInfo::new(2, "https://a.com", "A", 1).active(),
        TabInfo::new(3, "https://b.com", "B", 1),
    ]
}

/// Run startup to the first cache reset; returns the agent and the reset's commands
fn ready_agent(settings: Value, tabs: Vec<TabInfo>) -> (Agent, Vec<Command>) {
    let mut agent = Agent::new(AgentConfig::default());
    agent.handle(AgentEvent::Initialize);
    agent.handle(AgentEvent::SettingsLoaded { settings });
    let commands = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::Reset,
        tabs,
    });
    (agent, commands)
}

fn timers(commands: &[Command]) -> Vec<TimerCommand> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Timer(timer) => Some(*timer),
            _ => None,
        })
        .collect()
}

fn presentations(commands: &[Command]) -> Vec<&Presentation> {
    commands
        .iter()
        .filter_map(|c| match c {
            Command::Present(p) => Some(p),
            _ => None,
        })
        .collect()
}

fn request(agent: &mut Agent, request_id: u32, message: Value) -> Vec<Command> {
    agent.handle(AgentEvent::Request { request_id, message })
}

#[test]
fn test_startup_reaches_ready_and_presents() {
    let (agent, commands) = ready_agent(json!({}), scenario_a_tabs());

    assert_eq!(agent.phase(), Phase::Ready);
    assert_eq!(agent.cache().len(), 3);

    let shown = presentations(&commands);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].icon_state, IconState::Active);
    assert_eq!(shown[0].badge_text, "1");
    assert_eq!(shown[0].badge_color, BadgeColor::Green.rgba());
    assert_eq!(
        shown[0].tooltip_text,
        "Tabs: 3 || Duplicates: 1\n## Duplicate sites\n2 : A"
    );
}

#[test]
fn test_startup_uses_configured_badge_color() {
    let (_, commands) = ready_agent(json!({ "badgeColor": "purple" }), scenario_a_tabs());

    assert_eq!(presentations(&commands)[0].badge_color, BadgeColor::Purple.rgba());
}

#[test]
fn test_reconcile_without_changes_is_silent() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let tick = agent.handle(AgentEvent::ReconcileTick);
    assert_eq!(
        tick,
        vec![Command::QueryTabs {
            purpose: QueryPurpose::Reconcile,
            current_window_only: false,
        }]
    );

    let reconciled = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::Reconcile,
        tabs: scenario_a_tabs(),
    });
    assert!(reconciled.is_empty());
    assert_eq!(agent.phase(), Phase::Ready);
}

#[test]
fn test_reconcile_corrects_drift() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    // Tab 1 was closed while an event got lost
    let commands = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::Reconcile,
        tabs: scenario_a_tabs().into_iter().skip(1).collect(),
    });

    let shown = presentations(&commands);
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].icon_state, IconState::Inactive);
    assert_eq!(shown[0].badge_text, "2");
    assert_eq!(shown[0].badge_color, BadgeColor::NEUTRAL);
}

#[test]
fn test_failed_badge_update_is_pushed_again() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let failed = agent.handle(AgentEvent::HostCallFailed {
        operation: "action.setBadgeText".to_string(),
        error: "No tab with id".to_string(),
    });
    assert!(failed.is_empty());

    let commands = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::Reconcile,
        tabs: scenario_a_tabs(),
    });
    assert_eq!(presentations(&commands).len(), 1);
}

#[test]
fn test_tab_events_update_badge() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = agent.handle(AgentEvent::TabRemoved { tab_id: 1 });

    assert_eq!(presentations(&commands)[0].badge_text, "2");
    assert_eq!(agent.counts().duplicate_count, 0);

    let commands = agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(4, "https://b.com", "B", 1),
    });
    assert_eq!(presentations(&commands)[0].badge_text, "1");
    assert_eq!(agent.counts().duplicates_list[0].url, "https://b.com");
}

#[test]
fn test_status_only_update_is_ignored() {
    let (mut agent, _) = ready_agent(json!({ "autoClose": true }), scenario_a_tabs());

    let event: AgentEvent = serde_json::from_value(json!({
        "event": "tabUpdated",
        "tabId": 3,
        "changeInfo": { "status": "loading" },
        "tab": { "id": 3, "url": "https://c.com", "title": "C", "windowId": 1 }
    }))
    .unwrap();

    assert!(agent.handle(event).is_empty());
    assert_eq!(agent.cache().get(3).unwrap().normalized_url, "https://b.com");
}

#[test]
fn test_navigation_updates_cache() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = agent.handle(AgentEvent::TabUpdated {
        tab_id: 3,
        change_info: serde_json::from_value(json!({ "url": "https://a.com" })).unwrap(),
        tab: TabInfo::new(3, "https://a.com", "A", 1),
    });

    assert_eq!(presentations(&commands)[0].badge_text, "2");
}

#[test]
fn test_replaced_tab_is_dropped() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    agent.handle(AgentEvent::TabReplaced {
        added_tab_id: 9,
        removed_tab_id: 1,
    });

    assert!(agent.cache().get(1).is_none());
    assert_eq!(agent.cache().len(), 2);
}

#[test]
fn test_activation_moves_within_window() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    agent.handle(AgentEvent::TabActivated {
        tab_id: 3,
        window_id: 1,
    });

    assert!(agent.cache().get(3).unwrap().active);
    assert!(!agent.cache().get(2).unwrap().active);
}

#[test]
fn test_suspended_tab_counts_as_duplicate() {
    let tabs = vec![
        TabInfo::new(1, "https://example.com", "Example", 1),
        TabInfo::new(2, SUSPENDED_EXAMPLE, "Example", 1),
    ];
    let (mut agent, _) = ready_agent(json!({}), tabs.clone());

    let record = agent.cache().get(2).unwrap();
    assert!(record.is_suspended);
    assert_eq!(record.normalized_url, "https://example.com");
    assert_eq!(agent.counts().duplicate_count, 1);

    agent.handle(AgentEvent::UserAction {
        action: UserAction::ToolbarClick,
    });
    let commands = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::CloseDuplicates { automatic: false },
        tabs,
    });

    assert_eq!(commands, vec![Command::RemoveTabs { tab_ids: vec![2] }]);
}

#[test]
fn test_toolbar_click_closes_duplicates() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = agent.handle(AgentEvent::UserAction {
        action: UserAction::ToolbarClick,
    });
    assert_eq!(
        commands,
        vec![Command::QueryTabs {
            purpose: QueryPurpose::CloseDuplicates { automatic: false },
            current_window_only: false,
        }]
    );

    let commands = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::CloseDuplicates { automatic: false },
        tabs: scenario_a_tabs(),
    });
    assert_eq!(commands, vec![Command::RemoveTabs { tab_ids: vec![1] }]);
}

#[test]
fn test_keyboard_command() {
    let (mut agent, _) = ready_agent(json!({ "currentWindowOnly": true }), scenario_a_tabs());

    let commands = agent.handle(AgentEvent::UserAction {
        action: UserAction::Command {
            name: CLOSE_DUPLICATES_COMMAND.to_string(),
        },
    });
    assert_eq!(
        commands,
        vec![Command::QueryTabs {
            purpose: QueryPurpose::CloseDuplicates { automatic: false },
            current_window_only: true,
        }]
    );

    let other = agent.handle(AgentEvent::UserAction {
        action: UserAction::Command {
            name: "open-options".to_string(),
        },
    });
    assert!(other.is_empty());
}

#[test]
fn test_manual_close_with_sorting() {
    let tabs = vec![
        TabInfo::new(1, "https://c.com", "C", 1),
        TabInfo::new(2, "https://a.com", "A", 1),
        TabInfo::new(3, "https://c.com", "C", 1),
    ];
    let (mut agent, _) = ready_agent(json!({ "sortTabs": true }), tabs.clone());

    let commands = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::CloseDuplicates { automatic: false },
        tabs,
    });

    assert_eq!(
        commands,
        vec![
            Command::RemoveTabs { tab_ids: vec![3] },
            Command::MoveTab(TabMove { tab_id: 2, index: 0 }),
            Command::MoveTab(TabMove { tab_id: 1, index: 1 }),
        ]
    );
}

#[test]
fn test_auto_close_is_debounced() {
    let (mut agent, _) = ready_agent(json!({ "autoClose": true }), scenario_a_tabs());

    let first = agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(4, "https://b.com", "B", 1),
    });
    assert_eq!(timers(&first), vec![TimerCommand::Schedule { token: 1, delay_ms: 2000 }]);

    let second = agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(5, "https://b.com", "B", 1),
    });
    assert_eq!(
        timers(&second),
        vec![
            TimerCommand::Cancel { token: 1 },
            TimerCommand::Schedule { token: 2, delay_ms: 2000 },
        ]
    );

    // The cancelled timer raced its clearTimeout
    assert!(agent.handle(AgentEvent::TimerFired { token: 1 }).is_empty());

    let fired = agent.handle(AgentEvent::TimerFired { token: 2 });
    assert_eq!(
        fired,
        vec![Command::QueryTabs {
            purpose: QueryPurpose::CloseDuplicates { automatic: true },
            current_window_only: false,
        }]
    );
}

#[test]
fn test_no_timer_without_auto_close() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(4, "https://b.com", "B", 1),
    });

    assert!(timers(&commands).is_empty());
}

#[test]
fn test_disabling_auto_close_cancels_pending_pass() {
    let (mut agent, _) = ready_agent(json!({ "autoClose": true }), scenario_a_tabs());
    agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(4, "https://b.com", "B", 1),
    });

    let commands = agent.handle(AgentEvent::SettingsLoaded {
        settings: json!({ "autoClose": false }),
    });

    assert_eq!(
        commands[0],
        Command::Timer(TimerCommand::Cancel { token: 1 })
    );
    assert_eq!(
        commands[1],
        Command::QueryTabs {
            purpose: QueryPurpose::Reset,
            current_window_only: false,
        }
    );
}

#[test]
fn test_stale_automatic_result_is_discarded() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::CloseDuplicates { automatic: true },
        tabs: scenario_a_tabs(),
    });

    assert!(commands.is_empty());
}

#[test]
fn test_settings_change_rebuilds_cache() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let changed = agent.handle(AgentEvent::SettingsChanged {
        area: "sync".to_string(),
    });
    assert_eq!(changed, vec![Command::LoadSettings]);

    let reloaded = agent.handle(AgentEvent::SettingsLoaded {
        settings: json!({ "currentWindowOnly": true }),
    });
    assert_eq!(
        reloaded,
        vec![Command::QueryTabs {
            purpose: QueryPurpose::Reset,
            current_window_only: true,
        }]
    );
    assert!(agent.settings().current_window_only);
}

#[test]
fn test_get_counts_request() {
    let (mut agent, _) = ready_agent(json!({ "sortTabs": true }), scenario_a_tabs());

    let commands = request(&mut agent, 7, json!({ "type": "GET_COUNTS" }));
    assert_eq!(
        commands,
        vec![Command::QueryTabs {
            purpose: QueryPurpose::Counts { request_id: 7 },
            current_window_only: false,
        }]
    );

    let commands = agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::Counts { request_id: 7 },
        tabs: scenario_a_tabs(),
    });

    let Command::Respond { request_id, response } = &commands[0] else {
        panic!("expected a response, got {:?}", commands);
    };
    assert_eq!(*request_id, 7);

    let json = serde_json::to_value(response).unwrap();
    assert_eq!(json["ok"], true);
    assert_eq!(json["totalTabs"], 3);
    assert_eq!(json["uniqueUrls"], 2);
    assert_eq!(json["duplicates"], 1);
    assert_eq!(json["duplicatesCloseable"], 1);
    assert_eq!(json["topDomains"][0], json!({ "domain": "a.com", "count": 2 }));
    assert_eq!(
        json["settings"],
        json!({ "autoClose": false, "currentWindowOnly": false, "sortTabs": true })
    );
}

#[test]
fn test_get_counts_query_failure() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());
    request(&mut agent, 8, json!({ "type": "GET_COUNTS" }));

    let commands = agent.handle(AgentEvent::QueryFailed {
        purpose: QueryPurpose::Counts { request_id: 8 },
        error: "Extension context invalidated".to_string(),
    });

    assert_eq!(
        commands,
        vec![Command::Respond {
            request_id: 8,
            response: Response::failed(&AgentError::host("tabs.query", "Extension context invalidated")),
        }]
    );
}

#[test]
fn test_close_duplicates_request() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = request(&mut agent, 2, json!({ "type": "CLOSE_DUPLICATES" }));

    assert_eq!(
        commands,
        vec![
            Command::QueryTabs {
                purpose: QueryPurpose::CloseDuplicates { automatic: false },
                current_window_only: false,
            },
            Command::Respond {
                request_id: 2,
                response: Response::ok(),
            },
        ]
    );
}

#[test]
fn test_set_auto_close_responds_after_persist() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = request(&mut agent, 3, json!({ "type": "SET_AUTO_CLOSE", "value": true }));
    assert_eq!(
        commands,
        vec![Command::PersistSettings {
            patch: SettingsPatch::auto_close(true),
            request_id: Some(3),
        }]
    );
    assert!(!agent.settings().auto_close);

    let commands = agent.handle(AgentEvent::PersistCompleted {
        request_id: Some(3),
        error: None,
    });
    assert_eq!(
        commands,
        vec![Command::Respond {
            request_id: 3,
            response: Response::ok(),
        }]
    );
    assert!(agent.settings().auto_close);
}

#[test]
fn test_set_auto_close_persist_failure() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());
    request(&mut agent, 4, json!({ "type": "SET_AUTO_CLOSE", "value": true }));

    let commands = agent.handle(AgentEvent::PersistCompleted {
        request_id: Some(4),
        error: Some("QUOTA_BYTES exceeded".to_string()),
    });

    let Command::Respond { response, .. } = &commands[0] else {
        panic!("expected a response, got {:?}", commands);
    };
    assert!(!response.ok);
    assert_eq!(
        response.error.as_deref(),
        Some("storage.sync.set failed: QUOTA_BYTES exceeded")
    );

    // The unsaved value must not take effect
    assert!(!agent.settings().auto_close);
    let commands = agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(4, "https://b.com", "B", 1),
    });
    assert!(timers(&commands).is_empty());
}

#[test]
fn test_turning_auto_close_off_cancels_timer() {
    let (mut agent, _) = ready_agent(json!({ "autoClose": true }), scenario_a_tabs());
    agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(4, "https://b.com", "B", 1),
    });

    let commands = request(&mut agent, 5, json!({ "type": "SET_AUTO_CLOSE", "value": false }));
    assert!(matches!(commands.as_slice(), [Command::PersistSettings { .. }]));

    let commands = agent.handle(AgentEvent::PersistCompleted {
        request_id: Some(5),
        error: None,
    });
    assert_eq!(
        commands,
        vec![
            Command::Timer(TimerCommand::Cancel { token: 1 }),
            Command::Respond {
                request_id: 5,
                response: Response::ok(),
            },
        ]
    );
    assert!(agent.handle(AgentEvent::TimerFired { token: 1 }).is_empty());
}

#[test]
fn test_set_auto_close_accepts_truthy_values() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = request(&mut agent, 9, json!({ "type": "SET_AUTO_CLOSE", "value": 1 }));

    assert_eq!(
        commands,
        vec![Command::PersistSettings {
            patch: SettingsPatch::auto_close(true),
            request_id: Some(9),
        }]
    );
}

#[test]
fn test_current_window_only_ignores_other_windows() {
    let tabs = vec![TabInfo::new(1, "https://a.com", "A", 1).active()];
    let (mut agent, _) = ready_agent(json!({ "currentWindowOnly": true }), tabs);

    let created = agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(2, "https://a.com", "A", 2),
    });
    assert!(created.is_empty());

    let updated = agent.handle(AgentEvent::TabUpdated {
        tab_id: 3,
        change_info: serde_json::from_value(json!({ "url": "https://a.com" })).unwrap(),
        tab: TabInfo::new(3, "https://a.com", "A", 2),
    });
    assert!(updated.is_empty());

    assert_eq!(agent.cache().len(), 1);
    assert_eq!(agent.counts().duplicate_count, 0);

    // Same-window events still land
    let commands = agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(4, "https://a.com", "A", 1),
    });
    assert_eq!(presentations(&commands)[0].badge_text, "1");
}

#[test]
fn test_switching_window_rebuilds_cache() {
    let tabs = vec![TabInfo::new(1, "https://a.com", "A", 1).active()];
    let (mut agent, _) = ready_agent(json!({ "currentWindowOnly": true }), tabs);

    let commands = agent.handle(AgentEvent::TabActivated {
        tab_id: 2,
        window_id: 2,
    });
    assert_eq!(
        commands,
        vec![Command::QueryTabs {
            purpose: QueryPurpose::Reset,
            current_window_only: true,
        }]
    );

    agent.handle(AgentEvent::TabsQueried {
        purpose: QueryPurpose::Reset,
        tabs: vec![
            TabInfo::new(2, "https://b.com", "B", 2).active(),
            TabInfo::new(3, "https://b.com", "B", 2),
        ],
    });
    assert!(agent.cache().get(1).is_none());

    // Window 2 is tracked now, window 1 is not
    let commands = agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(5, "https://c.com", "C", 1),
    });
    assert!(commands.is_empty());
    assert_eq!(agent.counts().duplicate_count, 1);
}

#[test]
fn test_all_windows_tracked_by_default() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    agent.handle(AgentEvent::TabCreated {
        tab: TabInfo::new(7, "https://b.com", "B", 2),
    });
    let commands = agent.handle(AgentEvent::TabActivated {
        tab_id: 7,
        window_id: 2,
    });

    assert_eq!(agent.cache().len(), 4);
    assert!(agent.cache().get(7).unwrap().active);
    assert!(!commands.iter().any(|c| matches!(c, Command::QueryTabs { .. })));
}

#[test]
fn test_unknown_request_gets_error_response() {
    let (mut agent, _) = ready_agent(json!({}), scenario_a_tabs());

    let commands = request(&mut agent, 6, json!({ "type": "OPEN_OPTIONS" }));

    let Command::Respond { request_id, response } = &commands[0] else {
        panic!("expected a response, got {:?}", commands);
    };
    assert_eq!(*request_id, 6);
    assert!(!response.ok);
    assert!(response.error.as_deref().unwrap().starts_with("invalid message"));
}
