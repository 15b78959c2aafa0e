mod test_certificate_authority;
mod test_san_properties;
mod test_settings;
mod test_signer;
