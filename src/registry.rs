//! Pattern registry
//!
//! Maps a pattern id to a detector constructor, its parameter schema and its
//! metadata, so callers can work with "a pattern" by name.

use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    detectors::*,
    params::{ParamBag, ParamDefault, ParamMeta, ParamValue, ParameterizedDetector},
    BuiltinDetector, Error, PatternDetector, PatternMetadata, Result,
};

/// Builds a configured detector from a parameter bag
pub type DetectorFactory = fn(&ParamBag) -> Result<Box<dyn PatternDetector>>;

/// One registered pattern
#[derive(Debug, Clone)]
pub struct PatternEntry {
    id: &'static str,
    factory: DetectorFactory,
    schema: &'static [ParamMeta],
    metadata: PatternMetadata,
}

impl PatternEntry {
    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn schema(&self) -> &'static [ParamMeta] {
        self.schema
    }

    pub fn metadata(&self) -> &PatternMetadata {
        &self.metadata
    }

    /// Construct the detector. Missing keys take their defaults.
    pub fn build(&self, params: &ParamBag) -> Result<Box<dyn PatternDetector>> {
        (self.factory)(params)
    }

    /// Defaults from the schema. Optional parameters are left out.
    pub fn default_params(&self) -> ParamBag {
        self.schema
            .iter()
            .filter_map(|meta| {
                let value = match meta.default {
                    ParamDefault::Number(v) => ParamValue::Number(v),
                    ParamDefault::Flag(b) => ParamValue::Flag(b),
                    ParamDefault::Choice(s) => ParamValue::Text(s.to_string()),
                    ParamDefault::Unset => return None,
                };
                Some((meta.name.to_string(), value))
            })
            .collect()
    }
}

/// Catalog of detectors keyed by pattern id
#[derive(Debug, Clone, Default)]
pub struct PatternRegistry {
    entries: BTreeMap<&'static str, PatternEntry>,
}

fn builtin_factory<D>(params: &ParamBag) -> Result<Box<dyn PatternDetector>>
where
    D: ParameterizedDetector + PatternDetector,
    BuiltinDetector: From<D>,
{
    let detector = BuiltinDetector::from(D::with_params(params)?);
    detector.validate_config()?;
    Ok(Box::new(detector))
}

impl PatternRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every builtin pattern
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        // Single bar
        registry.register_builtin::<HammerDetector>();
        registry.register_builtin::<ShootingStarDetector>();
        registry.register_builtin::<DojiDetector>();
        registry.register_builtin::<MarubozuDetector>();
        registry.register_builtin::<ElephantBarDetector>();
        // Two bar
        registry.register_builtin::<EngulfingDetector>();
        registry.register_builtin::<HaramiDetector>();
        registry.register_builtin::<PiercingLineDetector>();
        registry.register_builtin::<DarkCloudCoverDetector>();
        registry.register_builtin::<TweezerTopDetector>();
        registry.register_builtin::<TweezerBottomDetector>();
        registry.register_builtin::<KickerDetector>();
        registry.register_builtin::<CounterAttackDetector>();
        // Three bar
        registry.register_builtin::<ThreeWhiteSoldiersDetector>();
        registry.register_builtin::<ThreeBlackCrowsDetector>();
        registry.register_builtin::<MorningStarDetector>();
        registry.register_builtin::<EveningStarDetector>();
        registry.register_builtin::<ThreeInsideUpDetector>();
        registry.register_builtin::<ThreeInsideDownDetector>();
        registry
    }

    fn register_builtin<D>(&mut self)
    where
        D: ParameterizedDetector + PatternDetector + Default,
        BuiltinDetector: From<D>,
    {
        self.register(
            D::pattern_id_str(),
            builtin_factory::<D>,
            D::param_meta(),
            D::default().metadata(),
        );
    }

    /// Add a pattern, replacing any entry with the same id
    pub fn register(
        &mut self,
        id: &'static str,
        factory: DetectorFactory,
        schema: &'static [ParamMeta],
        metadata: PatternMetadata,
    ) {
        let entry = PatternEntry {
            id,
            factory,
            schema,
            metadata,
        };
        if self.entries.insert(id, entry).is_some() {
            debug!(pattern = id, "replaced registered pattern");
        } else {
            debug!(pattern = id, params = schema.len(), "registered pattern");
        }
    }

    /// Look up a pattern by id
    pub fn get(&self, id: &str) -> Result<&PatternEntry> {
        self.entries.get(id).ok_or_else(|| Error::UnknownPattern {
            requested: id.to_string(),
            known: self.list().into_iter().map(str::to_string).collect(),
        })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    /// Registered ids in sorted order
    pub fn list(&self) -> Vec<&'static str> {
        self.entries.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metadata(&self, id: &str) -> Result<&PatternMetadata> {
        self.get(id).map(PatternEntry::metadata)
    }

    pub fn schema(&self, id: &str) -> Result<&'static [ParamMeta]> {
        self.get(id).map(PatternEntry::schema)
    }

    pub fn default_params(&self, id: &str) -> Result<ParamBag> {
        self.get(id).map(PatternEntry::default_params)
    }

    /// Resolve `id` and construct its detector from `params`
    pub fn build(&self, id: &str, params: &ParamBag) -> Result<Box<dyn PatternDetector>> {
        self.get(id)?.build(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{params::param_bag, ErrorKind, PatternCategory};

    #[test]
    fn test_builtins_registered() {
        let registry = PatternRegistry::with_builtins();
        assert_eq!(registry.len(), 19);
        assert!(registry.contains("hammer"));
        assert!(registry.contains("three_inside_down"));
        assert!(!registry.contains("is_hammer"));

        let ids = registry.list();
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn test_every_builtin_builds_with_defaults() {
        let registry = PatternRegistry::with_builtins();
        for id in registry.list() {
            let bag = registry.default_params(id).unwrap();
            let detector = registry.build(id, &bag).unwrap();
            assert_eq!(detector.id().as_str(), id);
        }
    }

    #[test]
    fn test_unknown_pattern_lists_known_ids() {
        let registry = PatternRegistry::with_builtins();
        let err = registry.get("hanging_man").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownPattern);
        let message = err.to_string();
        assert!(message.contains("hanging_man"));
        assert!(message.contains("engulfing"));
    }

    #[test]
    fn test_build_rejects_bad_params() {
        let registry = PatternRegistry::with_builtins();
        let bag = param_bag([("ma_period", ParamValue::from(0usize))]);
        let err = registry.build("engulfing", &bag).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidParameter);

        let bag = param_bag([("shadow_balance_ratio", ParamValue::from(0.9))]);
        assert!(registry.build("doji", &bag).is_err());
    }

    #[test]
    fn test_metadata_and_defaults() {
        let registry = PatternRegistry::with_builtins();
        let meta = registry.metadata("morning_star").unwrap();
        assert_eq!(meta.category, PatternCategory::ThreeBar);

        let defaults = registry.default_params("hammer").unwrap();
        assert_eq!(defaults.get("body_size_ratio"), Some(&ParamValue::Number(0.3)));
        assert_eq!(defaults.get("require_green"), Some(&ParamValue::Flag(true)));
        // optional gate stays unset
        assert!(!defaults.contains_key("min_relative_volume"));
    }

    #[test]
    fn test_register_custom_pattern() {
        fn factory(params: &ParamBag) -> Result<Box<dyn PatternDetector>> {
            Ok(Box::new(HammerDetector::with_params(params)?))
        }

        let mut registry = PatternRegistry::new();
        assert!(registry.is_empty());
        registry.register(
            "my_hammer",
            factory,
            HammerDetector::param_meta(),
            HammerDetector::default().metadata(),
        );
        assert_eq!(registry.list(), vec!["my_hammer"]);
        assert!(registry.build("my_hammer", &ParamBag::new()).is_ok());
    }
}
