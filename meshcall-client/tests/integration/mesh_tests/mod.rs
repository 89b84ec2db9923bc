pub mod test_membership_links;
