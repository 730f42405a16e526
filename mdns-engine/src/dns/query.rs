/// A question in a DNS message.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query {
    pub name: String,
    pub rtype: u16,
    /// The QU bit: the querier prefers a unicast reply
    pub unicast_response: bool,
}

impl Query {
    pub fn new(name: impl Into<String>, rtype: u16) -> Self {
        Self {
            name: name.into(),
            rtype,
            unicast_response: false,
        }
    }
}
