//! Pure update function for the TEA (The Elm Architecture) pattern.
//!
//! The update function takes a model and a message, mutates the model,
//! and returns a list of commands to execute.

use crossterm::event::{KeyCode, KeyEvent};

use crate::store::StoreEvent;
use crate::{cwlog, cwlog_debug, cwlog_warn};

use super::command::Command;
use super::message::Message;
use super::model::{InputKind, Mode, Model, Notification, NotificationLevel};

/// Helper to set an error notification and mark model as dirty.
fn set_error(model: &mut Model, message: String) {
    cwlog_warn!("UI Error: {}", message);
    model.notification = Some(Notification {
        level: NotificationLevel::Error,
        message,
    });
    model.dirty = true;
}

fn set_info(model: &mut Model, message: String) {
    model.notification = Some(Notification {
        level: NotificationLevel::Info,
        message,
    });
    model.dirty = true;
}

/// Pure update function: Model + Message → Commands
///
/// All I/O happens via the returned Commands.
pub fn update(model: &mut Model, msg: Message) -> Vec<Command> {
    let mut cmds = Vec::new();

    match msg {
        Message::Key(key) => {
            model.notification = None; // Clear notification on any key press
            model.dirty = true;
            match model.mode {
                Mode::List => update_list_mode(model, key, &mut cmds),
                Mode::Variables(_) => update_variables_mode(model, key),
                Mode::Input(kind) => update_input_mode(model, key, kind, &mut cmds),
            }
        }

        Message::Resize(_, _) => {
            model.dirty = true;
        }

        Message::Store(event) => apply_store_event(model, event, &mut cmds),

        Message::CasesLoaded { site, cases } => {
            if model.active_site.as_deref() != Some(site.as_str()) {
                cwlog_debug!("Message::CasesLoaded for stale site {}, ignored", site);
                return cmds;
            }
            cwlog!("Loaded {} cases for site {}", cases.len(), site);
            model.cases = cases;
            model.loading = false;
            model.clamp_selection();
            model.dirty = true;
            cmds.push(Command::SyncPollers);
        }

        Message::CasesLoadFailed { site, error } => {
            if model.active_site.as_deref() == Some(site.as_str()) {
                model.loading = false;
                set_error(model, format!("Failed to load cases for '{}': {}", site, error));
            }
        }

        Message::RunFailed(id, err) => {
            set_error(model, format!("Run failed for case {}: {}", id, err));
        }

        Message::CreateFailed(name, err) => {
            set_error(model, format!("Failed to create '{}': {}", name, err));
        }

        Message::DeleteFailed(id, err) => {
            set_error(model, format!("Failed to delete case {}: {}", id, err));
        }

        Message::EditFailed(id, err) => {
            set_error(model, format!("Failed to edit case {}: {}", id, err));
        }

        Message::DownloadFinished(id, result) => match result {
            Ok(path) => set_info(model, format!("Case {} saved to {}", id, path.display())),
            Err(err) => set_error(model, format!("Download failed for case {}: {}", id, err)),
        },
    }

    cmds
}

fn apply_store_event(model: &mut Model, event: StoreEvent, cmds: &mut Vec<Command>) {
    match &event {
        StoreEvent::UpdateSelectedSiteCase { case } => {
            match model.case(case.id) {
                Some(current) if current == case => return,
                Some(_) => {}
                None => {
                    cwlog_debug!("Update for unlisted case {}, ignored", case.id);
                    return;
                }
            }
            cwlog_debug!(
                "Case {} updated: status={} create={} run={}",
                case.id,
                case.status,
                case.create_task.label(),
                case.run_task.label()
            );
        }
        StoreEvent::AddSelectedSiteCase { case } => {
            cwlog!("Case {} added", case.id);
        }
        StoreEvent::RemoveSelectedSiteCase { id } => {
            if model.mode == Mode::Variables(*id) {
                model.mode = Mode::List;
            }
        }
    }

    let added = matches!(event, StoreEvent::AddSelectedSiteCase { .. });
    event.apply(&mut model.cases);
    if added {
        model.selected = model.cases.len().saturating_sub(1);
    }
    model.clamp_selection();
    model.dirty = true;
    cmds.push(Command::SyncPollers);
}

fn update_list_mode(model: &mut Model, key: KeyEvent, cmds: &mut Vec<Command>) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            if !model.cases.is_empty() {
                model.selected = (model.selected + 1) % model.cases.len();
            }
        }

        KeyCode::Char('k') | KeyCode::Up => {
            if !model.cases.is_empty() {
                model.selected = model
                    .selected
                    .checked_sub(1)
                    .unwrap_or(model.cases.len() - 1);
            }
        }

        KeyCode::Char('r') => {
            if let Some(case) = model.selected_case() {
                if case.can_run() {
                    cmds.push(Command::RunCase { id: case.id });
                }
            }
        }

        KeyCode::Char('D') => {
            if let Some(case) = model.selected_case() {
                // Busy indicator doubles as the repeat-press guard
                if case.can_download() && !model.downloads.is_downloading(case.id) {
                    cmds.push(Command::DownloadCase { id: case.id });
                }
            }
        }

        KeyCode::Char('v') | KeyCode::Enter => {
            if let Some(case) = model.selected_case() {
                model.mode = Mode::Variables(case.id);
            }
        }

        KeyCode::Char('d') => {
            if let Some(case) = model.selected_case() {
                model.pending_delete = Some(case.id);
                model.mode = Mode::Input(InputKind::Confirm);
                model.input_buffer.clear();
            }
        }

        KeyCode::Char('e') => {
            if let Some(case) = model.selected_case() {
                let (id, name) = (case.id, case.name.clone().unwrap_or_default());
                model.pending_edit = Some(id);
                model.mode = Mode::Input(InputKind::Rename);
                model.input_buffer = name;
            }
        }

        KeyCode::Char('n') => {
            if model.active_site.is_some() {
                model.mode = Mode::Input(InputKind::CaseName);
                model.input_buffer.clear();
            } else {
                set_error(model, "Select a site first (press 's')".to_string());
            }
        }

        KeyCode::Char('s') => {
            model.mode = Mode::Input(InputKind::Site);
            model.input_buffer = model.active_site.clone().unwrap_or_default();
        }

        KeyCode::Char('g') => {
            if let Some(site) = model.active_site.clone() {
                model.loading = true;
                cmds.push(Command::LoadCases { site });
            }
        }

        KeyCode::Char('q') | KeyCode::Esc => {
            cmds.push(Command::Quit);
        }

        KeyCode::Char('?') => {
            model.show_keymap = !model.show_keymap;
        }

        _ => {}
    }
}

fn update_variables_mode(model: &mut Model, key: KeyEvent) {
    if matches!(
        key.code,
        KeyCode::Esc | KeyCode::Enter | KeyCode::Char('v') | KeyCode::Char('q')
    ) {
        model.mode = Mode::List;
    }
}

fn update_input_mode(model: &mut Model, key: KeyEvent, kind: InputKind, cmds: &mut Vec<Command>) {
    match key.code {
        KeyCode::Enter => {
            let value = std::mem::take(&mut model.input_buffer).trim().to_string();
            model.mode = Mode::List;

            match kind {
                InputKind::Site => select_site(model, value, cmds),
                InputKind::CaseName => {
                    if let (false, Some(site)) = (value.is_empty(), model.active_site.clone()) {
                        cmds.push(Command::CreateCase { site, name: value });
                    }
                }
                InputKind::Rename => {
                    if let Some(id) = model.pending_edit.take() {
                        let unchanged = model
                            .case(id)
                            .is_some_and(|c| c.name.as_deref() == Some(value.as_str()));
                        if !value.is_empty() && !unchanged {
                            cmds.push(Command::RenameCase { id, name: value });
                        }
                    }
                }
                InputKind::Confirm => {
                    if let Some(id) = model.pending_delete.take() {
                        cmds.push(Command::DeleteCase { id });
                    }
                }
            }
        }

        KeyCode::Esc => {
            model.input_buffer.clear();
            model.pending_delete = None;
            model.pending_edit = None;
            model.mode = Mode::List;
        }

        KeyCode::Backspace => {
            model.input_buffer.pop();
        }

        KeyCode::Char(c) => {
            model.input_buffer.push(c);
        }

        _ => {}
    }
}

/// Switch the active site. An empty name clears it, which idles every poller.
fn select_site(model: &mut Model, site: String, cmds: &mut Vec<Command>) {
    let site = (!site.is_empty()).then_some(site);
    if site == model.active_site {
        return;
    }

    cwlog!("Active site: {:?} -> {:?}", model.active_site, site);
    model.active_site = site.clone();
    model.cases.clear();
    model.selected = 0;
    model.loading = site.is_some();
    cmds.push(Command::SyncPollers);
    if let Some(site) = site {
        cmds.push(Command::LoadCases { site });
    }
}
