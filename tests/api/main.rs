mod verification_codes;
