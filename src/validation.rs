/// Provides email address validation functionality
pub struct AddressValidator;

impl AddressValidator {
    /// Creates a new AddressValidator instance
    pub fn new() -> Self {
        Self {}
    }

    /// Validates the local part (before the @) of an address
    ///
    /// This function checks that the local part:
    /// - Is between 1 and 64 characters (RFC 5321)
    /// - Consists of atext characters and dots
    /// - Does not start or end with a dot
    /// - Does not contain consecutive dots
    pub fn validate_local_part(&self, local: &str) -> bool {
        if local.is_empty() || local.len() > 64 {
            return false;
        }

        if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
            return false;
        }

        local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "!#$%&'*+/=?^_`{|}~.-".contains(c))
    }

    /// Validates a domain name for format and syntax
    ///
    /// This function checks that the domain:
    /// - Contains at least one dot (.)
    /// - Has a valid TLD (at least 2 characters)
    /// - Does not exceed 253 characters (RFC 1035)
    /// - Consists of valid characters (a-z, 0-9, -, .)
    /// - Does not have consecutive dots
    /// - Does not start or end with a dot or hyphen
    /// - Each label (part between dots) does not exceed 63 characters
    pub fn validate_domain_format(&self, domain: &str) -> bool {
        if domain.is_empty() || domain.len() > 253 || !domain.contains('.') {
            return false;
        }

        let labels: Vec<&str> = domain.split('.').collect();

        match labels.last() {
            Some(tld) if tld.len() >= 2 => {}
            _ => return false,
        }

        labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
                && !label.starts_with('-')
                && !label.ends_with('-')
        })
    }

    /// Checks a complete `local@domain` address
    pub fn validate_address_format(&self, address: &str) -> bool {
        if address.len() > 254 {
            return false;
        }

        match address.split_once('@') {
            Some((local, domain)) => {
                !domain.contains('@')
                    && self.validate_local_part(local)
                    && self.validate_domain_format(domain)
            }
            None => false,
        }
    }
}

impl Default for AddressValidator {
    fn default() -> Self {
        Self::new()
    }
}

/// True when `input` is a well-formed email address that can be used verbatim
pub fn is_well_formed_address(input: &str) -> bool {
    AddressValidator::new().validate_address_format(input)
}
