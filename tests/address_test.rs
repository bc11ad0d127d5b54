use netsock::net::addr::{IpAddress, IpVersion, MacAddress, IP_WIRE_LEN};
use netsock::net::error::{code_to_size, size_to_code, status_code, ErrorClass, NetError};
use netsock::net::types::{Security, Ssid, WifiAccessPoint, WIFI_AP_RECORD_LEN};

#[test]
fn test_v4_round_trip() {
    let addr: IpAddress = "192.168.1.1".parse().unwrap();
    assert_eq!(addr.version(), IpVersion::V4);
    assert_eq!(addr.as_bytes(), &[192, 168, 1, 1]);

    let rebuilt = IpAddress::from_bytes(IpVersion::V4, addr.as_bytes()).unwrap();
    assert_eq!(rebuilt, addr);
    assert_eq!(rebuilt.to_string(), "192.168.1.1");
}

#[test]
fn test_v6_round_trip() {
    let addr: IpAddress = "2001:db8::1".parse().unwrap();
    assert_eq!(addr.version(), IpVersion::V6);
    assert_eq!(addr.as_bytes().len(), 16);
    assert_eq!(addr.to_string(), "2001:db8::1");

    let wire = addr.to_wire();
    assert_eq!(wire.len(), IP_WIRE_LEN);
    assert_eq!(IpAddress::from_wire(&wire), Ok(addr));
}

#[test]
fn test_v4_never_equals_v6() {
    let v4 = IpAddress::v4([192, 168, 1, 1]);
    let mapped: IpAddress = "::ffff:192.168.1.1".parse().unwrap();
    assert_ne!(v4, mapped);

    // same leading bytes, different version
    let mut raw = [0u8; 16];
    raw[..4].copy_from_slice(&[192, 168, 1, 1]);
    assert_ne!(v4, IpAddress::v6(raw));
}

#[test]
fn test_unspecified_address() {
    let addr = IpAddress::default();
    assert!(addr.is_unspecified());
    assert!(!addr.is_routable_destination());
    assert!(!IpAddress::V4_ANY.is_routable_destination());
    assert!(IpAddress::V4_LOOPBACK.is_routable_destination());
    assert_eq!(addr.to_string(), "unspecified");
    assert_eq!(IpAddress::from_wire(&addr.to_wire()), Ok(addr));
}

#[test]
fn test_bad_literals() {
    assert_eq!("256.1.1.1".parse::<IpAddress>(), Err(NetError::Parameter));
    assert_eq!("example.com".parse::<IpAddress>(), Err(NetError::Parameter));
    assert_eq!(
        IpAddress::from_bytes(IpVersion::V4, &[1, 2, 3]),
        Err(NetError::Parameter)
    );
}

#[test]
fn test_mac_text_form() {
    let mac: MacAddress = "00:1A:2b:3c:4d:5e".parse().unwrap();
    assert_eq!(mac.octets(), [0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
    assert_eq!(mac.to_string(), "00:1a:2b:3c:4d:5e");
    assert!("00:1a:2b:3c:4d".parse::<MacAddress>().is_err());
    assert!("00:1a:2b:3c:4d:5e:6f".parse::<MacAddress>().is_err());
}

#[test]
fn test_error_codes() {
    assert_eq!(NetError::WouldBlock.code(), -3001);
    assert_eq!(NetError::DeviceError.code(), -3012);
    for err in NetError::ALL {
        assert_eq!(NetError::from_code(err.code()), Some(err));
    }

    assert_eq!(NetError::WouldBlock.class(), ErrorClass::Transient);
    assert_eq!(NetError::NoMemory.class(), ErrorClass::ResourceExhausted);
    assert!(NetError::WouldBlock.is_retryable());
    assert!(!NetError::Parameter.is_retryable());
}

#[test]
fn test_integer_return_channel() {
    assert_eq!(size_to_code(Ok(10)), 10);
    assert_eq!(size_to_code(Err(NetError::WouldBlock)), -3001);
    assert_eq!(status_code(Ok(())), 0);
    assert_eq!(code_to_size(10), Ok(10));
    assert_eq!(code_to_size(-3005), Err(NetError::NoSocket));
    assert_eq!(code_to_size(-1), Err(NetError::DeviceError));
}

#[test]
fn test_access_point_record() {
    let ap = WifiAccessPoint::new(
        Ssid::new("office").unwrap(),
        "02:00:00:00:00:01".parse().unwrap(),
        Security::Wpa2,
        -61,
        11,
    );
    let bytes = ap.to_bytes();
    assert_eq!(bytes.len(), WIFI_AP_RECORD_LEN);
    assert_eq!(&bytes[..7], b"office\0");

    let decoded = WifiAccessPoint::from_bytes(&bytes).unwrap();
    assert_eq!(decoded, ap);
    assert_eq!(decoded.ssid.as_str(), Some("office"));
    assert_eq!(decoded.rssi, -61);
}
