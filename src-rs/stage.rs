use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Upload,
    Preview,
    Analysis,
    Report,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Upload, Stage::Preview, Stage::Analysis, Stage::Report];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Upload => "Upload X-ray",
            Self::Preview => "Preview X-ray",
            Self::Analysis => "Analysis",
            Self::Report => "Report",
        }
    }

    pub fn next(self) -> Option<Self> {
        Self::from_index(self.index() + 1)
    }
}

pub const STAGE_COUNT: usize = Stage::ALL.len();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert_eq!(STAGE_COUNT, 4);
        assert_eq!(Stage::Upload.next(), Some(Stage::Preview));
        assert_eq!(Stage::Analysis.next(), Some(Stage::Report));
        assert_eq!(Stage::Report.next(), None);
        assert_eq!(Stage::from_index(2), Some(Stage::Analysis));
        assert_eq!(Stage::Report.title(), "Report");
    }
}
