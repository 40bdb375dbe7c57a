use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
/// The stored string doubles as the wire name.
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

str_enum!(OtpPurpose {
    EmailVerification => "EMAIL_VERIFICATION",
    PhoneVerification => "PHONE_VERIFICATION",
    Login => "LOGIN",
    PasswordReset => "PASSWORD_RESET",
});

impl Default for OtpPurpose {
    fn default() -> Self {
        Self::EmailVerification
    }
}

str_enum!(BloodGroup {
    APositive => "A+",
    ANegative => "A-",
    BPositive => "B+",
    BNegative => "B-",
    AbPositive => "AB+",
    AbNegative => "AB-",
    OPositive => "O+",
    ONegative => "O-",
});

str_enum!(RecordType {
    Prescription => "PRESCRIPTION",
    LabReport => "LAB_REPORT",
    Vaccination => "VACCINATION",
    ScanXray => "SCAN_XRAY",
    DischargeSummary => "DISCHARGE_SUMMARY",
    BillInvoice => "BILL_INVOICE",
    Other => "OTHER",
});

str_enum!(ReminderType {
    Medicine => "MEDICINE",
    Appointment => "APPOINTMENT",
    Checkup => "CHECKUP",
    Vaccination => "VACCINATION",
    Other => "OTHER",
});

str_enum!(ReminderFrequency {
    Daily => "daily",
    Weekly => "weekly",
    Monthly => "monthly",
});

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn otp_purpose_round_trip() {
        for (variant, s) in [
            (OtpPurpose::EmailVerification, "EMAIL_VERIFICATION"),
            (OtpPurpose::PhoneVerification, "PHONE_VERIFICATION"),
            (OtpPurpose::Login, "LOGIN"),
            (OtpPurpose::PasswordReset, "PASSWORD_RESET"),
        ] {
            assert_eq!(variant.as_str(), s);
            assert_eq!(OtpPurpose::from_str(s).unwrap(), variant);
        }
    }

    #[test]
    fn blood_group_has_eight_values() {
        assert_eq!(BloodGroup::ALL.len(), 8);
        assert_eq!(BloodGroup::from_str("AB-").unwrap(), BloodGroup::AbNegative);
    }

    #[test]
    fn wire_names_match_stored_names() {
        let json = serde_json::to_string(&RecordType::ScanXray).unwrap();
        assert_eq!(json, "\"SCAN_XRAY\"");
        let parsed: BloodGroup = serde_json::from_str("\"O+\"").unwrap();
        assert_eq!(parsed, BloodGroup::OPositive);
        let freq: ReminderFrequency = serde_json::from_str("\"weekly\"").unwrap();
        assert_eq!(freq, ReminderFrequency::Weekly);
    }

    #[test]
    fn default_purpose_is_email_verification() {
        assert_eq!(OtpPurpose::default(), OtpPurpose::EmailVerification);
    }

    #[test]
    fn invalid_enum_returns_error() {
        assert!(OtpPurpose::from_str("email_verification").is_err());
        assert!(BloodGroup::from_str("C+").is_err());
        assert!(ReminderType::from_str("").is_err());
        assert!(serde_json::from_str::<RecordType>("\"XRAY\"").is_err());
    }
}
