mod test_provisioning;
