//! User-facing message catalogue.

use std::str::FromStr;

use serde::Deserialize;

use crate::operation::OperationKind;

/// Delay assumed when a 429 carries no usable hint.
pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Th,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "en" | "english" => Ok(Self::En),
            "th" | "thai" => Ok(Self::Th),
            other => Err(format!("Invalid locale '{other}': expected en or th.")),
        }
    }
}

/// Round a server-suggested delay up to whole seconds. Missing, non-finite
/// and non-positive values fall back to the default.
#[must_use]
pub fn retry_after_secs(hint: Option<f64>) -> u64 {
    match hint {
        // `as` saturates, so absurd hints cannot wrap.
        Some(secs) if secs.is_finite() && secs > 0.0 => secs.ceil() as u64,
        _ => DEFAULT_RETRY_AFTER_SECS,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Messages {
    locale: Locale,
}

impl Messages {
    #[must_use]
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }

    #[must_use]
    pub fn locale(&self) -> Locale {
        self.locale
    }

    #[must_use]
    pub fn prompt_required(&self) -> String {
        match self.locale {
            Locale::En => "Please enter a prompt".into(),
            Locale::Th => "กรุณาใส่ prompt".into(),
        }
    }

    #[must_use]
    pub fn aspect_ratio_required(&self) -> String {
        match self.locale {
            Locale::En => "Please choose an aspect ratio".into(),
            Locale::Th => "กรุณาเลือกสัดส่วนภาพ".into(),
        }
    }

    #[must_use]
    pub fn upload_succeeded(&self) -> String {
        match self.locale {
            Locale::En => "Image uploaded successfully".into(),
            Locale::Th => "รูปภาพอัปโหลดสำเร็จ".into(),
        }
    }

    #[must_use]
    pub fn upload_failed(&self) -> String {
        match self.locale {
            Locale::En => "Upload failed".into(),
            Locale::Th => "เกิดข้อผิดพลาดในการอัปโหลด".into(),
        }
    }

    #[must_use]
    pub fn connection_failed(&self) -> String {
        match self.locale {
            Locale::En => "Could not connect to the server".into(),
            Locale::Th => "ไม่สามารถเชื่อมต่อกับเซิร์ฟเวอร์".into(),
        }
    }

    #[must_use]
    pub fn rate_limited(&self, secs: u64) -> String {
        match self.locale {
            Locale::En => format!("Too many requests. Please wait {secs} seconds"),
            Locale::Th => format!("คุณส่งคำขอบ่อยเกินไป กรุณารอ {secs} วินาที"),
        }
    }

    /// Fallback when the server gave no message for a failed operation.
    #[must_use]
    pub fn operation_failed(&self, kind: OperationKind) -> String {
        match (self.locale, kind) {
            (Locale::En, OperationKind::Assist) => "Failed to process the prompt".into(),
            (Locale::En, OperationKind::Generate) => "Failed to generate the image".into(),
            (Locale::Th, OperationKind::Assist) => "เกิดข้อผิดพลาดในการประมวลผล".into(),
            (Locale::Th, OperationKind::Generate) => "เกิดข้อผิดพลาดในการสร้างรูปภาพ".into(),
        }
    }

    #[must_use]
    pub fn from_cache(&self) -> String {
        match self.locale {
            Locale::En => "Result served from cache".into(),
            Locale::Th => "ใช้ผลลัพธ์จาก cache".into(),
        }
    }

    #[must_use]
    pub fn image_generated(&self) -> String {
        match self.locale {
            Locale::En => "Image generated!".into(),
            Locale::Th => "รูปภาพถูกสร้างเรียบร้อยแล้ว!".into(),
        }
    }

    #[must_use]
    pub fn preview_unavailable(&self) -> String {
        match self.locale {
            Locale::En => "Cannot show a preview of this image".into(),
            Locale::Th => "ไม่สามารถแสดงตัวอย่างรูปนี้ได้".into(),
        }
    }

    #[must_use]
    pub fn copied(&self) -> String {
        match self.locale {
            Locale::En => "Copied to clipboard".into(),
            Locale::Th => "คัดลอกแล้ว".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_hint_rounds_up() {
        assert_eq!(retry_after_secs(Some(42.3)), 43);
        assert_eq!(retry_after_secs(Some(42.0)), 42);
        assert_eq!(retry_after_secs(Some(0.2)), 1);
    }

    #[test]
    fn missing_or_unusable_hint_defaults_to_sixty() {
        assert_eq!(retry_after_secs(None), 60);
        assert_eq!(retry_after_secs(Some(0.0)), 60);
        assert_eq!(retry_after_secs(Some(-3.0)), 60);
        assert_eq!(retry_after_secs(Some(f64::NAN)), 60);
    }

    #[test]
    fn rate_limit_message_cites_seconds() {
        let en = Messages::new(Locale::En);
        let th = Messages::new(Locale::Th);
        assert!(en.rate_limited(43).contains("43"));
        assert!(th.rate_limited(60).contains("60"));
        assert_ne!(
            en.operation_failed(OperationKind::Assist),
            en.operation_failed(OperationKind::Generate)
        );
    }

    #[test]
    fn locale_parsing() {
        assert_eq!("TH".parse::<Locale>(), Ok(Locale::Th));
        assert_eq!("english".parse::<Locale>(), Ok(Locale::En));
        assert!("fr".parse::<Locale>().is_err());
    }
}
