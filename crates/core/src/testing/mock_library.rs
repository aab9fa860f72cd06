//! Mock library service for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::library::{
    Author, CommandState, LibraryCommand, LibraryError, LibraryService, QualityProfile,
    WantedItem, WantedPage, WantedSource,
};

/// A recorded wanted-list request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWantedQuery {
    pub source: WantedSource,
    pub page: u32,
    pub page_size: u32,
}

#[derive(Debug, Default)]
struct State {
    wanted: HashMap<WantedSource, Vec<WantedItem>>,
    authors: HashMap<i64, Author>,
    profiles: HashMap<i64, QualityProfile>,
    isbns: HashMap<String, i64>,
    /// Final command state by submitted path; missing paths complete.
    command_outcomes: HashMap<String, CommandState>,
    commands: Vec<LibraryCommand>,
    /// Polls answered with `Started` before the final state, per command id.
    pending_polls: HashMap<i64, u32>,
    command_polls_fail: bool,
    updates: Vec<WantedItem>,
    wanted_queries: Vec<RecordedWantedQuery>,
    unreachable: bool,
    transient_failures: u32,
    author_calls: usize,
}

/// Mock implementation of the LibraryService trait.
///
/// Wanted lists are paged from in-memory vectors. Commands start queued,
/// report `Started` once, then settle on the outcome configured for their
/// path (`Completed` by default).
#[derive(Debug, Default)]
pub struct MockLibrary {
    state: Arc<RwLock<State>>,
}

impl MockLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_wanted(&self, source: WantedSource, items: Vec<WantedItem>) {
        self.state.write().await.wanted.insert(source, items);
    }

    pub async fn add_author(&self, author: Author) {
        self.state.write().await.authors.insert(author.id, author);
    }

    pub async fn add_profile(&self, profile: QualityProfile) {
        self.state.write().await.profiles.insert(profile.id, profile);
    }

    pub async fn add_isbn(&self, isbn: &str, item_id: i64) {
        self.state
            .write()
            .await
            .isbns
            .insert(isbn.to_string(), item_id);
    }

    pub async fn set_command_outcome(&self, path: &str, state: CommandState) {
        self.state
            .write()
            .await
            .command_outcomes
            .insert(path.to_string(), state);
    }

    pub async fn set_command_polls_fail(&self, fails: bool) {
        self.state.write().await.command_polls_fail = fails;
    }

    /// Every call fails with a connection error.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.write().await.unreachable = unreachable;
    }

    /// The next `count` calls fail with a connection error.
    pub async fn fail_next(&self, count: u32) {
        self.state.write().await.transient_failures = count;
    }

    pub async fn submitted_commands(&self) -> Vec<LibraryCommand> {
        self.state.read().await.commands.clone()
    }

    pub async fn updates(&self) -> Vec<WantedItem> {
        self.state.read().await.updates.clone()
    }

    pub async fn wanted_queries(&self) -> Vec<RecordedWantedQuery> {
        self.state.read().await.wanted_queries.clone()
    }

    pub async fn author_calls(&self) -> usize {
        self.state.read().await.author_calls
    }

    fn check_reachable(state: &mut State) -> Result<(), LibraryError> {
        if state.unreachable {
            return Err(LibraryError::ConnectionFailed("connection refused".to_string()));
        }
        if state.transient_failures > 0 {
            state.transient_failures -= 1;
            return Err(LibraryError::ConnectionFailed("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl LibraryService for MockLibrary {
    fn name(&self) -> &str {
        "mock"
    }

    async fn wanted(
        &self,
        source: WantedSource,
        page: u32,
        page_size: u32,
    ) -> Result<WantedPage, LibraryError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&mut state)?;
        state.wanted_queries.push(RecordedWantedQuery {
            source,
            page,
            page_size,
        });

        let items = state.wanted.get(&source).cloned().unwrap_or_default();
        let skip = (page.saturating_sub(1) * page_size) as usize;
        Ok(WantedPage {
            page,
            page_size,
            total_records: items.len() as u32,
            records: items
                .into_iter()
                .skip(skip)
                .take(page_size as usize)
                .collect(),
        })
    }

    async fn get_author(&self, author_id: i64) -> Result<Author, LibraryError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&mut state)?;
        state.author_calls += 1;
        state
            .authors
            .get(&author_id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(format!("author {}", author_id)))
    }

    async fn get_quality_profile(&self, profile_id: i64) -> Result<QualityProfile, LibraryError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&mut state)?;
        state
            .profiles
            .get(&profile_id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(format!("quality profile {}", profile_id)))
    }

    async fn update_item(&self, item: &WantedItem) -> Result<(), LibraryError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&mut state)?;
        state.updates.push(item.clone());
        for items in state.wanted.values_mut() {
            for existing in items.iter_mut().filter(|i| i.id == item.id) {
                existing.monitored = item.monitored;
            }
        }
        Ok(())
    }

    async fn lookup_isbn(&self, isbn: &str) -> Result<Option<i64>, LibraryError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&mut state)?;
        Ok(state.isbns.get(isbn).copied())
    }

    async fn submit_command(
        &self,
        name: &str,
        path: &str,
    ) -> Result<LibraryCommand, LibraryError> {
        let mut state = self.state.write().await;
        Self::check_reachable(&mut state)?;
        let command = LibraryCommand {
            id: state.commands.len() as i64 + 1,
            name: name.to_string(),
            state: CommandState::Queued,
            path: Some(path.to_string()),
            message: None,
        };
        state.pending_polls.insert(command.id, 1);
        state.commands.push(command.clone());
        Ok(command)
    }

    async fn get_command(&self, command_id: i64) -> Result<LibraryCommand, LibraryError> {
        let mut state = self.state.write().await;
        if state.command_polls_fail {
            return Err(LibraryError::ApiError("command status unavailable".to_string()));
        }
        let mut command = state
            .commands
            .iter()
            .find(|c| c.id == command_id)
            .cloned()
            .ok_or_else(|| LibraryError::NotFound(format!("command {}", command_id)))?;

        let pending = state.pending_polls.entry(command_id).or_insert(0);
        if *pending > 0 {
            *pending -= 1;
            command.state = CommandState::Started;
            return Ok(command);
        }

        command.state = command
            .path
            .as_ref()
            .and_then(|p| state.command_outcomes.get(p))
            .copied()
            .unwrap_or(CommandState::Completed);
        if command.state.is_failure() {
            command.message = Some("import failed".to_string());
        }
        Ok(command)
    }
}
