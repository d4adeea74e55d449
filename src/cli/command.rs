use std::path::PathBuf;

/// Programmatic form of every `shelfdb` subcommand. JSON arguments use the Mongo wire shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Find {
        filter_json: String,
        projection_json: Option<String>,
        sort_json: Option<String>,
        skip: Option<usize>,
        limit: Option<usize>,
    },
    Count {
        filter_json: String,
    },
    UpdateOne {
        filter_json: String,
        update_json: String,
    },
    UpdateMany {
        filter_json: String,
        update_json: String,
    },
    DeleteOne {
        filter_json: String,
    },
    DeleteMany {
        filter_json: String,
    },
    Aggregate {
        pipeline_json: String,
    },
    CreateIndex {
        keys_json: String,
        name: Option<String>,
    },
    DropIndex {
        name: String,
    },
    ListIndexes,
    Explain {
        filter_json: String,
        verbosity: Option<String>,
    },
    Import {
        file: PathBuf,
        format: Option<String>,
        skip_errors: bool,
    },
    Export {
        file: PathBuf,
        format: Option<String>,
        filter_json: Option<String>,
        limit: Option<usize>,
    },
    /// Run the sixteen book statements against a seeded in-memory catalogue.
    Demo,
}

impl Command {
    /// Whether the data file must be written back after the command.
    #[must_use]
    pub const fn mutates_data(&self) -> bool {
        matches!(
            self,
            Self::UpdateOne { .. }
                | Self::UpdateMany { .. }
                | Self::DeleteOne { .. }
                | Self::DeleteMany { .. }
                | Self::Import { .. }
        )
    }

    /// Whether the index sidecar must be written back after the command.
    #[must_use]
    pub const fn mutates_indexes(&self) -> bool {
        matches!(self, Self::CreateIndex { .. } | Self::DropIndex { .. })
    }
}
