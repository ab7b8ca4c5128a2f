pub mod blockstore {
    tonic::include_proto!("blockstore");
}

use models::{MatchType, Matcher};

impl From<&models::Label> for blockstore::Label {
    fn from(l: &models::Label) -> Self {
        blockstore::Label {
            name: l.name.clone(),
            value: l.value.clone(),
        }
    }
}

impl From<&models::Labels> for blockstore::Series {
    fn from(labels: &models::Labels) -> Self {
        blockstore::Series {
            labels: labels.iter().map(blockstore::Label::from).collect(),
        }
    }
}

impl TryFrom<&blockstore::LabelMatcher> for Matcher {
    type Error = models::Error;

    fn try_from(m: &blockstore::LabelMatcher) -> Result<Self, Self::Error> {
        let match_type = match blockstore::MatchType::from_i32(m.r#type) {
            Some(blockstore::MatchType::Equal) | None => MatchType::Equal,
            Some(blockstore::MatchType::NotEqual) => MatchType::NotEqual,
            Some(blockstore::MatchType::Regex) => MatchType::Regex,
            Some(blockstore::MatchType::NotRegex) => MatchType::NotRegex,
        };
        Matcher::new(match_type, m.name.clone(), m.value.clone())
    }
}
