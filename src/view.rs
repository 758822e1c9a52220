use serde::Serialize;

use crate::config::PickerConfig;
use crate::listing::LmsItem;
use crate::picker::{DialogState, PickerSnapshot};

pub const TITLE_AUTHORIZING: &str = "Allow file access";
pub const TITLE_SELECTING: &str = "Select a file";
pub const FETCH_ERROR_SUMMARY: &str = "There was a problem fetching files";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ButtonAction {
    Authorize,
    TryAgain,
    Select,
    Reload,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonView {
    pub action: ButtonAction,
    pub label: &'static str,
    pub disabled: bool,
}

impl ButtonView {
    fn new(action: ButtonAction, disabled: bool) -> Self {
        let label = match action {
            ButtonAction::Authorize => "Authorize",
            ButtonAction::TryAgain => "Try again",
            ButtonAction::Select => "Select",
            ButtonAction::Reload => "Reload",
        };
        Self {
            action,
            label,
            disabled,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum MessageView {
    Instructions { text: String },
    Error { summary: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRow {
    pub name: String,
    pub last_modified: String,
    pub is_folder: bool,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoFilesView {
    pub text: String,
    pub help_link: String,
    pub in_subfolder: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListView {
    pub rows: Vec<FileRow>,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_files: Option<NoFilesView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogView {
    pub title: &'static str,
    pub breadcrumbs: Vec<String>,
    pub buttons: Vec<ButtonView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<MessageView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_list: Option<FileListView>,
}

impl DialogView {
    pub fn from_snapshot(snapshot: &PickerSnapshot, config: &PickerConfig) -> Self {
        let breadcrumbs = snapshot
            .breadcrumbs
            .iter()
            .map(|entry| entry.display_name.clone())
            .collect();

        match &snapshot.dialog {
            DialogState::Authorizing => {
                let (button, message) = if snapshot.authorization_attempted {
                    (
                        ButtonAction::TryAgain,
                        MessageView::Error {
                            summary: format!("Failed to authorize with {}", config.lms_name),
                            detail: String::new(),
                        },
                    )
                } else {
                    (
                        ButtonAction::Authorize,
                        MessageView::Instructions {
                            text: format!(
                                "To select a file, you must authorize Hypothesis to access your files in {}.",
                                config.lms_name
                            ),
                        },
                    )
                };
                Self {
                    title: TITLE_AUTHORIZING,
                    breadcrumbs,
                    buttons: vec![ButtonView::new(button, false)],
                    message: Some(message),
                    file_list: None,
                }
            }
            DialogState::Error { error } => Self {
                title: TITLE_SELECTING,
                breadcrumbs,
                buttons: vec![ButtonView::new(ButtonAction::TryAgain, false)],
                message: Some(MessageView::Error {
                    summary: FETCH_ERROR_SUMMARY.to_string(),
                    detail: error.detail(),
                }),
                file_list: None,
            },
            DialogState::Fetching => Self {
                title: TITLE_SELECTING,
                breadcrumbs,
                buttons: vec![ButtonView::new(ButtonAction::Reload, true)],
                message: None,
                file_list: Some(FileListView {
                    rows: Vec::new(),
                    is_loading: true,
                    no_files: None,
                }),
            },
            DialogState::Fetched { files } => {
                let button = if files.is_empty() {
                    ButtonView::new(ButtonAction::Reload, false)
                } else {
                    ButtonView::new(ButtonAction::Select, snapshot.selected_file.is_none())
                };
                let no_files = files.is_empty().then(|| no_files_view(snapshot, config));
                Self {
                    title: TITLE_SELECTING,
                    breadcrumbs,
                    buttons: vec![button],
                    message: None,
                    file_list: Some(FileListView {
                        rows: files
                            .iter()
                            .map(|file| file_row(file, snapshot.selected_file.as_ref()))
                            .collect(),
                        is_loading: false,
                        no_files,
                    }),
                }
            }
        }
    }
}

fn file_row(file: &LmsItem, selected: Option<&LmsItem>) -> FileRow {
    FileRow {
        name: file.display_name.clone(),
        last_modified: file
            .last_modified()
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        is_folder: file.is_folder(),
        selected: selected == Some(file),
    }
}

fn no_files_view(snapshot: &PickerSnapshot, config: &PickerConfig) -> NoFilesView {
    let in_subfolder = snapshot.in_subfolder();
    let text = if in_subfolder {
        "There are no files in this folder.".to_string()
    } else {
        format!(
            "There are no supported files in the current {} course.",
            config.lms_name
        )
    };
    NoFilesView {
        text,
        help_link: config.missing_files_help_link.clone(),
        in_subfolder,
    }
}
