use std::fmt;
use uuid::Uuid;

/// Kinds of records that carry a human-facing external code
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
pub enum CodeKind {
    #[strum(serialize = "CUST")]
    Customer,
    #[strum(serialize = "ITEM")]
    Item,
    #[strum(serialize = "ORD")]
    Order,
    #[strum(serialize = "PAY")]
    Payment,
    #[strum(serialize = "SHP")]
    Shipping,
}

impl CodeKind {
    pub fn prefix(self) -> &'static str {
        self.into()
    }
}

/// Source of external codes. Uniqueness is ultimately enforced by the
/// unique indexes on each `*_code` column.
pub trait CodeGenerator: Send + Sync + fmt::Debug {
    fn generate(&self, kind: CodeKind) -> String;
}

/// `PREFIX-` followed by 12 uppercase hex digits of a random v4 UUID
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomCodeGenerator;

impl CodeGenerator for RandomCodeGenerator {
    fn generate(&self, kind: CodeKind) -> String {
        let hex = Uuid::new_v4().simple().to_string().to_uppercase();
        format!("{}-{}", kind.prefix(), &hex[..12])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn codes_carry_kind_prefix_and_fit_column() {
        let generator = RandomCodeGenerator;
        let code = generator.generate(CodeKind::Order);
        assert!(code.starts_with("ORD-"));
        assert_eq!(code.len(), 16);
        assert!(generator.generate(CodeKind::Customer).len() <= 20);
        assert!(generator.generate(CodeKind::Shipping).starts_with("SHP-"));
    }

    #[test]
    fn codes_do_not_repeat_in_practice() {
        let generator = RandomCodeGenerator;
        let codes: HashSet<String> = (0..1000)
            .map(|_| generator.generate(CodeKind::Payment))
            .collect();
        assert_eq!(codes.len(), 1000);
    }
}
