use log::warn;

use crate::error::SyncError;
use crate::sync::{NewProject, SyncClient, SyncProject};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverMode {
    List,
    Create,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Selected(u64),
    Abandoned,
}

impl Resolution {
    pub fn project_id(self) -> Option<u64> {
        match self {
            Resolution::Selected(id) => Some(id),
            Resolution::Abandoned => None,
        }
    }
}

/// Workflow that ends with one remote project id, or with nothing when the
/// operator walks away.
#[derive(Debug)]
pub struct ProjectResolver {
    client: SyncClient,
    mode: ResolverMode,
    projects: Vec<SyncProject>,
    search: String,
    selected: Option<u64>,
}

impl ProjectResolver {
    /// Fresh resolver in list mode with empty inputs.
    pub fn open(client: SyncClient) -> Self {
        Self {
            client,
            mode: ResolverMode::List,
            projects: Vec::new(),
            search: String::new(),
            selected: None,
        }
    }

    pub fn mode(&self) -> ResolverMode {
        self.mode
    }

    pub fn switch_mode(&mut self, mode: ResolverMode) {
        self.mode = mode;
    }

    pub fn selected(&self) -> Option<u64> {
        self.selected
    }

    /// Reload the project list. On failure the list is left empty and the
    /// error handed back for the caller to log or show.
    pub async fn refresh(&mut self) -> Result<&[SyncProject], SyncError> {
        match self.client.list_projects().await {
            Ok(mut projects) => {
                sort_newest_first(&mut projects);
                self.projects = projects;
                Ok(&self.projects)
            }
            Err(error) => {
                warn!("could not list sync projects: {}", error);
                self.projects.clear();
                Err(error)
            }
        }
    }

    pub fn set_search(&mut self, query: impl Into<String>) {
        self.search = query.into();
    }

    pub fn visible_projects(&self) -> Vec<&SyncProject> {
        filter_projects(&self.projects, &self.search)
    }

    /// Pick a project from the fetched list.
    pub fn select(&mut self, project_id: u64) -> Result<u64, SyncError> {
        if !self.projects.iter().any(|project| project.id == project_id) {
            return Err(SyncError::NotFound(project_id));
        }
        self.selected = Some(project_id);
        Ok(project_id)
    }

    /// Create a project and select it.
    pub async fn create(&mut self, project: &NewProject) -> Result<SyncProject, SyncError> {
        self.mode = ResolverMode::Create;
        let created = self.client.create_project(project).await?;
        self.selected = Some(created.id);
        Ok(created)
    }

    /// Accept an id typed by the operator without asking the platform.
    pub fn submit_manual(&mut self, input: &str) -> Result<u64, SyncError> {
        self.mode = ResolverMode::Manual;
        let id = parse_manual_id(input)?;
        self.selected = Some(id);
        Ok(id)
    }

    pub fn finish(self) -> Resolution {
        match self.selected {
            Some(id) => Resolution::Selected(id),
            None => Resolution::Abandoned,
        }
    }

    pub fn abandon(self) -> Resolution {
        Resolution::Abandoned
    }
}

pub fn parse_manual_id(input: &str) -> Result<u64, SyncError> {
    let trimmed = input.trim();
    match trimmed.parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(SyncError::InvalidProjectId(input.to_string())),
    }
}

/// Case-insensitive match on the name, or a substring of the numeric id.
pub fn filter_projects<'a>(projects: &'a [SyncProject], query: &str) -> Vec<&'a SyncProject> {
    let needle = query.trim().to_lowercase();
    projects
        .iter()
        .filter(|project| {
            needle.is_empty()
                || project.name.to_lowercase().contains(&needle)
                || project.id.to_string().contains(&needle)
        })
        .collect()
}

pub fn sort_newest_first(projects: &mut [SyncProject]) {
    projects.sort_by(|a, b| b.id.cmp(&a.id));
}
