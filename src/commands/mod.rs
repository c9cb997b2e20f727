pub mod corpus;
pub mod dedupe;
pub mod diff;
pub mod extract;
pub mod filter;
pub mod link;
pub mod notes;
pub mod scan;
pub mod table;

#[cfg(test)]
mod tests;
