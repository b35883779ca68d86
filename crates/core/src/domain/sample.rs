use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KitId(#[serde(deserialize_with = "crate::domain::string_or_number")] pub String);

impl fmt::Display for KitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestKit {
    #[serde(alias = "kitId")]
    pub id: KitId,
    #[serde(default, alias = "numberOfSamples")]
    pub sample_count: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    #[serde(alias = "sampleId")]
    pub id: String,
    #[serde(default)]
    pub participant_name: Option<String>,
    #[serde(default)]
    pub sample_type: Option<String>,
}

/// Sample info counts as submitted once every expected sample is recorded.
pub fn has_sample_info(kit: &TestKit, samples: &[Sample]) -> bool {
    samples.len() >= kit.sample_count as usize
}

#[cfg(test)]
mod tests {
    use super::{has_sample_info, KitId, Sample, TestKit};

    fn sample(id: &str) -> Sample {
        Sample { id: id.to_string(), participant_name: None, sample_type: None }
    }

    #[test]
    fn sample_info_requires_full_sample_count() {
        let kit = TestKit { id: KitId("K-1".to_string()), sample_count: 2 };
        assert!(!has_sample_info(&kit, &[sample("S-1")]));
        assert!(has_sample_info(&kit, &[sample("S-1"), sample("S-2")]));
    }
}
