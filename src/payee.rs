use super::*;

/// A single masternode/superblock payee, as carried by a `getblocktemplate`
/// response for payee-aware chains (e.g. Dash). `script` takes precedence
/// over `payee` (a base58 address) when both are present.
#[derive(Clone, PartialEq, Eq, Debug, Deserialize, Serialize)]
pub struct Payee {
    pub payee: Option<String>,
    #[serde(default, with = "hex::serde", rename = "script")]
    pub script: Vec<u8>,
    pub amount: u64,
}

impl Payee {
    pub fn script_pubkey(&self) -> Result<ScriptBuf> {
        if !self.script.is_empty() {
            return Ok(ScriptBuf::from_bytes(self.script.clone()));
        }

        let address = self
            .payee
            .as_deref()
            .context("payee has neither script nor address")?;

        Ok(Address::from_str(address)
            .context("invalid payee address")?
            .assume_checked()
            .script_pubkey())
    }
}

/// `getblocktemplate`'s `masternode`/`superblock` fields are either absent
/// or a JSON array of payees; modeled as a tagged union so deserialization
/// doesn't fail on the common absent case.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub enum TemplatePayees {
    #[default]
    Absent,
    List(Vec<Payee>),
}

impl<'de> Deserialize<'de> for TemplatePayees {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Vec<Payee>>::deserialize(deserializer)?;
        Ok(match value {
            None => TemplatePayees::Absent,
            Some(payees) if payees.is_empty() => TemplatePayees::Absent,
            Some(payees) => TemplatePayees::List(payees),
        })
    }
}

impl Serialize for TemplatePayees {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            TemplatePayees::Absent => serializer.serialize_none(),
            TemplatePayees::List(payees) => payees.serialize(serializer),
        }
    }
}

impl TemplatePayees {
    pub fn as_slice(&self) -> &[Payee] {
        match self {
            TemplatePayees::Absent => &[],
            TemplatePayees::List(payees) => payees,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_when_null() {
        let parsed: TemplatePayees = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, TemplatePayees::Absent);
    }

    #[test]
    fn absent_when_empty_array() {
        let parsed: TemplatePayees = serde_json::from_str("[]").unwrap();
        assert_eq!(parsed, TemplatePayees::Absent);
    }

    #[test]
    fn list_with_script_takes_precedence_over_payee() {
        let parsed: TemplatePayees =
            serde_json::from_str(r#"[{"payee":"ignored","script":"76a914","amount":500}]"#)
                .unwrap();
        let TemplatePayees::List(payees) = parsed else {
            panic!("expected List");
        };
        assert_eq!(payees[0].script_pubkey().unwrap().as_bytes(), &[0x76, 0xa9, 0x14]);
    }
}
