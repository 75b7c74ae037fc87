//! Prompt form model: text, counter, aspect ratio, and advanced options.

use crate::error_taxonomy::ValidationError;
use crate::models::AspectRatio;

/// Character count past which the counter is shown as a warning.
pub const PROMPT_SOFT_LIMIT: usize = 1800;

/// A numeric slider. Input is parsed like a range input would: unparsable
/// text keeps the current value, parsed values are clamped and snapped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeControl {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub default: f64,
    value: f64,
}

impl RangeControl {
    #[must_use]
    pub const fn new(min: f64, max: f64, step: f64, default: f64) -> Self {
        Self {
            min,
            max,
            step,
            default,
            value: default,
        }
    }

    #[must_use]
    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set(&mut self, value: f64) {
        if !value.is_finite() {
            return;
        }
        let snapped = if self.step > 0.0 {
            self.min + ((value - self.min) / self.step).round() * self.step
        } else {
            value
        };
        self.value = snapped.clamp(self.min, self.max);
    }

    /// Parse user text into the control. Returns whether the text parsed.
    pub fn set_from_str(&mut self, raw: &str) -> bool {
        match raw.trim().parse::<f64>() {
            Ok(value) if value.is_finite() => {
                self.set(value);
                true
            }
            _ => false,
        }
    }

    pub fn reset(&mut self) {
        self.value = self.default;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvancedOptions {
    pub negative_prompt: String,
    pub guidance_scale: RangeControl,
    pub inference_steps: RangeControl,
    /// Whether the advanced panel is expanded.
    pub visible: bool,
}

impl Default for AdvancedOptions {
    fn default() -> Self {
        Self::with_defaults(7.5, 20)
    }
}

impl AdvancedOptions {
    #[must_use]
    pub fn with_defaults(guidance_scale: f64, inference_steps: u32) -> Self {
        let mut guidance = RangeControl::new(1.0, 20.0, 0.5, 7.5);
        guidance.set(guidance_scale);
        guidance.default = guidance.value();
        let mut steps = RangeControl::new(1.0, 100.0, 1.0, 20.0);
        steps.set(f64::from(inference_steps));
        steps.default = steps.value();
        Self {
            negative_prompt: String::new(),
            guidance_scale: guidance,
            inference_steps: steps,
            visible: false,
        }
    }

    #[must_use]
    pub fn guidance_scale(&self) -> f64 {
        self.guidance_scale.value()
    }

    #[must_use]
    pub fn inference_steps(&self) -> u32 {
        self.inference_steps.value().round() as u32
    }

    pub fn toggle(&mut self) -> bool {
        self.visible = !self.visible;
        self.visible
    }

    pub fn reset(&mut self) {
        self.negative_prompt.clear();
        self.guidance_scale.reset();
        self.inference_steps.reset();
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptForm {
    prompt: String,
    aspect_ratio: Option<AspectRatio>,
    pub advanced: AdvancedOptions,
}

impl Default for PromptForm {
    fn default() -> Self {
        Self::new(Some(AspectRatio::default()), AdvancedOptions::default())
    }
}

impl PromptForm {
    #[must_use]
    pub fn new(aspect_ratio: Option<AspectRatio>, advanced: AdvancedOptions) -> Self {
        Self {
            prompt: String::new(),
            aspect_ratio,
            advanced,
        }
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: Option<AspectRatio>) {
        self.aspect_ratio = aspect_ratio;
    }

    #[must_use]
    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        self.aspect_ratio
    }

    #[must_use]
    pub fn char_count(&self) -> usize {
        self.prompt.chars().count()
    }

    #[must_use]
    pub fn over_soft_limit(&self) -> bool {
        self.char_count() > PROMPT_SOFT_LIMIT
    }

    /// The precondition shared by assist and generate.
    pub fn validated(&self) -> Result<(String, AspectRatio), ValidationError> {
        let prompt = self.prompt.trim();
        if prompt.is_empty() {
            return Err(ValidationError::EmptyPrompt);
        }
        let aspect_ratio = self
            .aspect_ratio
            .ok_or(ValidationError::MissingAspectRatio)?;
        Ok((prompt.to_string(), aspect_ratio))
    }

    pub fn clear_prompt(&mut self) {
        self.prompt.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_prompt_fails_validation() {
        let mut form = PromptForm::default();
        form.set_prompt("   \n\t ");
        assert_eq!(form.validated(), Err(ValidationError::EmptyPrompt));

        form.set_prompt("  a cat  ");
        assert_eq!(
            form.validated(),
            Ok(("a cat".to_string(), AspectRatio::Portrait))
        );

        form.set_aspect_ratio(None);
        assert_eq!(form.validated(), Err(ValidationError::MissingAspectRatio));
    }

    #[test]
    fn range_input_clamps_and_snaps() {
        let mut options = AdvancedOptions::default();
        assert!(options.guidance_scale.set_from_str("8.3"));
        assert_eq!(options.guidance_scale(), 8.5);
        assert!(options.guidance_scale.set_from_str("99"));
        assert_eq!(options.guidance_scale(), 20.0);
        assert!(!options.guidance_scale.set_from_str("lots"));
        assert_eq!(options.guidance_scale(), 20.0);

        assert!(options.inference_steps.set_from_str("0"));
        assert_eq!(options.inference_steps(), 1);

        options.reset();
        assert_eq!(options.guidance_scale(), 7.5);
        assert_eq!(options.inference_steps(), 20);
    }

    #[test]
    fn counter_counts_characters_not_bytes() {
        let mut form = PromptForm::default();
        form.set_prompt("แมว");
        assert_eq!(form.char_count(), 3);
        form.set_prompt("x".repeat(PROMPT_SOFT_LIMIT + 1));
        assert!(form.over_soft_limit());
    }

    #[test]
    fn configured_defaults_are_restored_on_reset() {
        let mut options = AdvancedOptions::with_defaults(12.0, 50);
        options.inference_steps.set(80.0);
        options.reset();
        assert_eq!(options.guidance_scale(), 12.0);
        assert_eq!(options.inference_steps(), 50);
    }
}
