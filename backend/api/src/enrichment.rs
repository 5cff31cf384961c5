//! Species facts for the adoption dashboard.
//!
//! The model is asked for a JSON object; whatever it returns is decoded
//! leniently. Any failure falls back to the built-in table so the dashboard
//! always has something to show.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::inference::{GenerationParams, ModelChain};

const ENRICHMENT_PARAMS: GenerationParams = GenerationParams {
    max_new_tokens: 300,
    temperature: 0.3,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactSource {
    Model,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeFacts {
    pub species: String,
    pub scientific_name: Option<String>,
    pub native_region: Option<String>,
    pub max_height_m: Option<f64>,
    pub lifespan_years: Option<u32>,
    pub co2_kg_per_year: Option<f64>,
    pub care_tips: Vec<String>,
    pub source: FactSource,
}

#[derive(Debug, Default)]
struct ModelFacts {
    scientific_name: Option<String>,
    native_region: Option<String>,
    max_height_m: Option<f64>,
    lifespan_years: Option<u32>,
    co2_kg_per_year: Option<f64>,
    care_tips: Vec<String>,
}

impl ModelFacts {
    /// Field-by-field decode: a wrongly typed field is dropped on its own.
    fn from_object(object: &Map<String, Value>) -> Self {
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        let number = |key: &str| {
            let n = match object.get(key)? {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }?;
            (n.is_finite() && n >= 0.0).then_some(n)
        };

        Self {
            scientific_name: text("scientific_name"),
            native_region: text("native_region"),
            max_height_m: number("max_height_m"),
            lifespan_years: number("lifespan_years")
                .filter(|n| *n <= f64::from(u32::MAX))
                .map(|n| n.round() as u32),
            co2_kg_per_year: number("co2_kg_per_year"),
            care_tips: object
                .get("care_tips")
                .and_then(Value::as_array)
                .map(|tips| {
                    tips.iter()
                        .filter_map(Value::as_str)
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
        }
    }

    fn is_empty(&self) -> bool {
        self.scientific_name.is_none()
            && self.native_region.is_none()
            && self.max_height_m.is_none()
            && self.lifespan_years.is_none()
            && self.co2_kg_per_year.is_none()
            && self.care_tips.is_empty()
    }
}

struct KnownSpecies {
    common: &'static str,
    scientific: &'static str,
    region: &'static str,
    height_m: f64,
    lifespan: u32,
    co2_kg: f64,
    tips: &'static [&'static str],
}

const KNOWN_SPECIES: &[KnownSpecies] = &[
    KnownSpecies {
        common: "neem",
        scientific: "Azadirachta indica",
        region: "Indian subcontinent",
        height_m: 20.0,
        lifespan: 200,
        co2_kg: 22.0,
        tips: &[
            "Water deeply once a week while young",
            "Tolerates drought once established",
            "Prune dead branches after the monsoon",
        ],
    },
    KnownSpecies {
        common: "banyan",
        scientific: "Ficus benghalensis",
        region: "India and Pakistan",
        height_m: 25.0,
        lifespan: 500,
        co2_kg: 28.0,
        tips: &[
            "Give aerial roots plenty of room",
            "Water regularly during the first two summers",
        ],
    },
    KnownSpecies {
        common: "peepal",
        scientific: "Ficus religiosa",
        region: "Indian subcontinent and Indochina",
        height_m: 30.0,
        lifespan: 900,
        co2_kg: 25.0,
        tips: &[
            "Plant away from walls and foundations",
            "Mulch the base to keep roots cool",
        ],
    },
    KnownSpecies {
        common: "mango",
        scientific: "Mangifera indica",
        region: "South Asia",
        height_m: 30.0,
        lifespan: 300,
        co2_kg: 20.0,
        tips: &[
            "Water weekly until the tree flowers",
            "Avoid waterlogging around the trunk",
        ],
    },
    KnownSpecies {
        common: "teak",
        scientific: "Tectona grandis",
        region: "South and Southeast Asia",
        height_m: 40.0,
        lifespan: 100,
        co2_kg: 24.0,
        tips: &["Needs full sun", "Keep the base free of weeds"],
    },
];

const GENERIC_TIPS: &[&str] = &[
    "Water young trees deeply once or twice a week",
    "Mulch around the base, keeping it off the trunk",
    "Check leaves monthly for pests",
];

/// Built-in facts for `species`, generic when the species is unknown.
pub fn fallback_facts(species: &str) -> TreeFacts {
    let key = species.trim().to_lowercase();
    match KNOWN_SPECIES.iter().find(|k| key.contains(k.common)) {
        Some(k) => TreeFacts {
            species: species.trim().to_string(),
            scientific_name: Some(k.scientific.to_string()),
            native_region: Some(k.region.to_string()),
            max_height_m: Some(k.height_m),
            lifespan_years: Some(k.lifespan),
            co2_kg_per_year: Some(k.co2_kg),
            care_tips: k.tips.iter().map(|t| t.to_string()).collect(),
            source: FactSource::Fallback,
        },
        None => TreeFacts {
            species: species.trim().to_string(),
            scientific_name: None,
            native_region: None,
            max_height_m: None,
            lifespan_years: None,
            co2_kg_per_year: Some(21.0),
            care_tips: GENERIC_TIPS.iter().map(|t| t.to_string()).collect(),
            source: FactSource::Fallback,
        },
    }
}

pub fn build_prompt(species: &str, location: Option<&str>) -> String {
    let place = location
        .map(|l| format!(" growing in {l}"))
        .unwrap_or_default();
    format!(
        "Give facts about the tree species \"{species}\"{place}.\n\
         Respond with only one JSON object and no other text, using exactly these keys:\n\
         scientific_name (string), native_region (string), max_height_m (number), \
         lifespan_years (integer), co2_kg_per_year (number), \
         care_tips (array of at most 3 short strings).\n"
    )
}

/// The outermost `{...}` span of `text`, if any.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

fn parse_model_facts(text: &str) -> Option<ModelFacts> {
    let json = extract_json_object(text)?;
    let value: Value = serde_json::from_str(json).ok()?;
    let facts = ModelFacts::from_object(value.as_object()?);
    (!facts.is_empty()).then_some(facts)
}

#[derive(Clone)]
pub struct TreeEnricher {
    chain: ModelChain,
}

impl TreeEnricher {
    pub fn new(chain: ModelChain) -> Self {
        Self { chain }
    }

    /// Never fails: model or parse errors produce [`fallback_facts`].
    pub async fn enrich(&self, species: &str, location: Option<&str>) -> TreeFacts {
        let prompt = build_prompt(species, location);
        let generated = match self.chain.generate(&prompt, ENRICHMENT_PARAMS).await {
            Ok(generated) => generated,
            Err(e) => {
                warn!("Tree enrichment for {species} failed: {e}");
                return fallback_facts(species);
            }
        };

        let Some(facts) = parse_model_facts(&generated.text) else {
            warn!(
                "Model {} returned no usable facts for {species}",
                generated.model
            );
            return fallback_facts(species);
        };

        debug!("Enriched {species} using {}", generated.model);
        let mut care_tips = facts.care_tips;
        care_tips.truncate(3);
        TreeFacts {
            species: species.trim().to_string(),
            scientific_name: facts.scientific_name,
            native_region: facts.native_region,
            max_height_m: facts.max_height_m,
            lifespan_years: facts.lifespan_years,
            co2_kg_per_year: facts.co2_kg_per_year,
            care_tips,
            source: FactSource::Model,
        }
    }
}
