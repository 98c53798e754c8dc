use serde::{Deserialize, Serialize};

/// Display views exposed by the application state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum View {
    Transversal,
    Sagittal,
    HorizontalLongAxis,
    ShortAxis,
    VerticalLongAxis,
}

impl View {
    pub const ALL: [View; 5] = [
        View::Transversal,
        View::Sagittal,
        View::HorizontalLongAxis,
        View::ShortAxis,
        View::VerticalLongAxis,
    ];

    pub fn file_stem(self) -> &'static str {
        match self {
            View::Transversal => "transversal",
            View::Sagittal => "sagittal",
            View::HorizontalLongAxis => "hla",
            View::ShortAxis => "sa",
            View::VerticalLongAxis => "vla",
        }
    }
}

/// Slice ordering when a volume is assembled from single-frame files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    ImagePositionPatient,
    TablePosition,
    InstanceNumber,
    None,
}

/// Where the radial-activity computation runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolarExecution {
    /// Synchronously inside the reactive cascade.
    #[default]
    Inline,
    /// On the rayon pool, results are applied by `AppState::poll`.
    Background,
}
