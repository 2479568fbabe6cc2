use crate::{participant::Contact, Error, Participant, Result};
use jid::Jid;
use std::fmt;

/// Canonical protocol address derived from a participant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    jid: Jid,
}

impl ResolvedAddress {
    pub fn new(jid: Jid) -> Self {
        Self { jid }
    }

    pub fn jid(&self) -> &Jid {
        &self.jid
    }

    /// Resource-qualified: pairwise lookups and capability checks are meaningful.
    pub fn is_full(&self) -> bool {
        self.jid.resource().is_some()
    }

    /// Missing its resource; provisional until the next resolution.
    pub fn is_bare(&self) -> bool {
        !self.is_full()
    }
}

impl fmt::Display for ResolvedAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.jid, f)
    }
}

/// Turns participants into resolved addresses using their current presence.
#[derive(Debug, Clone, Copy, Default)]
pub struct AddressResolver;

impl AddressResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn resolve(&self, participant: &Participant) -> Result<ResolvedAddress> {
        match participant {
            Participant::Individual(contact) => self.resolve_contact(contact),
            Participant::Group(group) => {
                // A room address is fixed; it never gains a resource.
                let jid = parse_jid(&group.address)?;
                Ok(ResolvedAddress::new(jid))
            }
        }
    }

    fn resolve_contact(&self, contact: &Contact) -> Result<ResolvedAddress> {
        let jid = parse_jid(&contact.address)?;
        if jid.resource().is_some() {
            return Ok(ResolvedAddress::new(jid));
        }

        let resource = non_empty(contact.resource.as_deref())
            .or_else(|| non_empty(contact.presence.resource.as_deref()));

        match resource {
            Some(resource) => {
                let full = format!("{}/{}", jid.to_bare(), resource);
                Ok(ResolvedAddress::new(parse_jid(&full)?))
            }
            None => Ok(ResolvedAddress::new(jid)),
        }
    }
}

fn parse_jid(address: &str) -> Result<Jid> {
    address
        .trim()
        .parse::<Jid>()
        .map_err(|e| Error::address(address, e))
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChatGroup, Presence};

    fn resolve(participant: impl Into<Participant>) -> Result<ResolvedAddress> {
        AddressResolver::new().resolve(&participant.into())
    }

    #[test]
    fn full_address_is_kept() {
        let resolved = resolve(Contact::new("bob@example.org/tablet")).unwrap();
        assert!(resolved.is_full());
        assert_eq!(resolved.to_string(), "bob@example.org/tablet");
    }

    #[test]
    fn explicit_resource_wins_over_presence() {
        let contact = Contact::new("bob@example.org")
            .with_resource("desk")
            .with_presence(Presence::online("phone"));
        let resolved = resolve(contact).unwrap();
        assert_eq!(resolved.to_string(), "bob@example.org/desk");
    }

    #[test]
    fn presence_resource_promotes_bare_address() {
        let contact = Contact::new("bob@example.org").with_presence(Presence::online("phone"));
        let resolved = resolve(contact).unwrap();
        assert!(resolved.is_full());
        assert_eq!(resolved.to_string(), "bob@example.org/phone");
    }

    #[test]
    fn no_resource_yields_provisional_bare_address() {
        let resolved = resolve(Contact::new("bob@example.org")).unwrap();
        assert!(resolved.is_bare());
        assert_eq!(resolved.to_string(), "bob@example.org");
    }

    #[test]
    fn empty_resource_is_ignored() {
        let contact = Contact::new("bob@example.org")
            .with_resource("  ")
            .with_presence(Presence::online(""));
        assert!(resolve(contact).unwrap().is_bare());
    }

    #[test]
    fn group_address_stays_bare() {
        let resolved = resolve(ChatGroup::new("room@conference.example.org")).unwrap();
        assert!(resolved.is_bare());
    }

    #[test]
    fn unparseable_address_is_an_address_error() {
        let err = resolve(Contact::new("bob@")).unwrap_err();
        assert!(matches!(err, Error::AddressFormat { ref address, .. } if address == "bob@"));
    }
}
